//! Node Data Structures
//!
//! This module defines the `Materialized` capability trait that every tree entity
//! implements, and `TreeNode`, the entity shipped with the crate.
//!
//! # Materialized Path Layout
//!
//! - **Path**: the chain of ancestor keys, root first, as `/a/b/c/` (roots store `""`)
//! - **Depth**: number of ancestors (0 for roots)
//! - **Order**: dense 1-based rank among siblings when ordering is enabled
//!
//! # Examples
//!
//! ```rust
//! use treepath_core::models::{Materialized, TreeNode};
//! use serde_json::json;
//!
//! let root = TreeNode::new("Root folder".to_string(), None, json!({}));
//! let child = TreeNode::new(
//!     "Child folder".to_string(),
//!     Some(root.key.clone()),
//!     json!({ "color": "blue" }),
//! );
//!
//! assert!(root.is_root());
//! assert!(child.is_child());
//! ```

use crate::operations::path_codec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a node in the hierarchy
pub type NodeKey = String;

/// Separator between ancestor keys inside a materialized path
pub const PATH_SEPARATOR: char = '/';

/// Validation errors for node data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid node key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}

/// Check that a key can be embedded in a materialized path
///
/// Keys must be non-empty and must not contain the path separator, otherwise
/// splitting a path back into ancestor keys would be ambiguous.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot be empty".to_string(),
        });
    }

    if key.contains(PATH_SEPARATOR) {
        return Err(ValidationError::InvalidKey {
            key: key.to_string(),
            reason: format!("key cannot contain '{}'", PATH_SEPARATOR),
        });
    }

    Ok(())
}

/// Capability interface for entities that live in a materialized-path tree
///
/// The engine never inspects anything beyond these accessors, so any record type
/// can participate by implementing them. Column names are a storage concern and
/// live in [`crate::config::TreeConfig`].
pub trait Materialized: Clone + Send + Sync + 'static {
    fn key(&self) -> &str;
    fn parent_key(&self) -> Option<&str>;
    fn path(&self) -> &str;
    fn depth(&self) -> u32;
    fn order(&self) -> Option<i64>;

    fn set_parent_key(&mut self, parent_key: Option<NodeKey>);
    fn set_path(&mut self, path: String);
    fn set_depth(&mut self, depth: u32);
    fn set_order(&mut self, order: Option<i64>);

    /// A node without a parent reference
    fn is_root(&self) -> bool {
        self.parent_key().is_none()
    }

    fn is_child(&self) -> bool {
        !self.is_root()
    }

    /// Path prefix shared by every descendant of this node
    fn lineage(&self) -> String {
        path_codec::lineage(self)
    }

    /// True when `other` appears in this node's ancestor chain
    fn is_descendant_of<O: Materialized>(&self, other: &O) -> bool {
        !self.path().is_empty() && self.path().starts_with(&other.lineage())
    }

    fn is_self_or_descendant_of<O: Materialized>(&self, other: &O) -> bool {
        self.key() == other.key() || self.is_descendant_of(other)
    }

    fn is_ancestor_of<O: Materialized>(&self, other: &O) -> bool {
        other.is_descendant_of(self)
    }

    fn is_self_or_ancestor_of<O: Materialized>(&self, other: &O) -> bool {
        self.key() == other.key() || self.is_ancestor_of(other)
    }
}

/// Tree record stored by the bundled stores
///
/// # Fields
///
/// - `key`: Unique identifier (UUID v4 unless supplied by the host)
/// - `name`: Display label, also the secondary sort key among siblings
/// - `parent_key`: Optional parent reference (`None` means root)
/// - `path`: Materialized ancestor chain, derived before every persist
/// - `depth`: Cached ancestor count, derived before every persist
/// - `order`: Sibling rank (dense `1..N` when ordering is enabled)
/// - `properties`: Free-form JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub key: NodeKey,

    pub name: String,

    pub parent_key: Option<NodeKey>,

    /// Derived; never set by hand outside of repair tooling
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub depth: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    pub properties: serde_json::Value,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,
}

impl TreeNode {
    /// Create a new node with an auto-generated UUID key
    ///
    /// Path and depth start empty; they are derived by
    /// [`TreeService::prepare_save`](crate::services::TreeService::prepare_save)
    /// before the node is persisted.
    pub fn new(name: String, parent_key: Option<NodeKey>, properties: serde_json::Value) -> Self {
        Self::new_with_key(Uuid::new_v4().to_string(), name, parent_key, properties)
    }

    /// Create a new node with a caller-provided key
    pub fn new_with_key(
        key: NodeKey,
        name: String,
        parent_key: Option<NodeKey>,
        properties: serde_json::Value,
    ) -> Self {
        let now = Utc::now();

        Self {
            key,
            name,
            parent_key,
            path: String::new(),
            depth: 0,
            order: None,
            properties,
            created_at: now,
            modified_at: now,
        }
    }

    /// Builder-style parent assignment
    pub fn with_parent(mut self, parent_key: impl Into<NodeKey>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }
}

impl Materialized for TreeNode {
    fn key(&self) -> &str {
        &self.key
    }

    fn parent_key(&self) -> Option<&str> {
        self.parent_key.as_deref()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn order(&self) -> Option<i64> {
        self.order
    }

    fn set_parent_key(&mut self, parent_key: Option<NodeKey>) {
        self.parent_key = parent_key;
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }

    fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    fn set_order(&mut self, order: Option<i64>) {
        self.order = order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(key: &str, parent: Option<&str>, path: &str) -> TreeNode {
        let mut node = TreeNode::new_with_key(
            key.to_string(),
            key.to_string(),
            parent.map(str::to_string),
            json!({}),
        );
        node.path = path.to_string();
        node
    }

    #[test]
    fn test_validate_key_rejects_separator_and_empty() {
        assert!(validate_key("node-1").is_ok());
        assert!(matches!(
            validate_key(""),
            Err(ValidationError::InvalidKey { .. })
        ));
        assert!(matches!(
            validate_key("a/b"),
            Err(ValidationError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_new_generates_unique_keys() {
        let a = TreeNode::new("A".to_string(), None, json!({}));
        let b = TreeNode::new("B".to_string(), None, json!({}));
        assert_ne!(a.key, b.key);
        assert!(validate_key(&a.key).is_ok());
        assert_eq!(a.path, "");
        assert_eq!(a.depth, 0);
    }

    #[test]
    fn test_descendant_predicates() {
        let root = node("r", None, "");
        let child = node("c", Some("r"), "/r/");
        let grandchild = node("g", Some("c"), "/r/c/");
        let other = node("o", None, "");

        assert!(child.is_descendant_of(&root));
        assert!(grandchild.is_descendant_of(&root));
        assert!(grandchild.is_descendant_of(&child));
        assert!(!root.is_descendant_of(&root));
        assert!(!child.is_descendant_of(&other));

        assert!(root.is_self_or_descendant_of(&root));
        assert!(root.is_ancestor_of(&grandchild));
        assert!(!grandchild.is_ancestor_of(&root));
        assert!(child.is_self_or_ancestor_of(&child));
    }

    #[test]
    fn test_prefix_does_not_match_sibling_with_shared_key_prefix() {
        let one = node("1", None, "");
        let eleven_child = node("x", Some("11"), "/11/");
        assert!(!eleven_child.is_descendant_of(&one));
    }

    #[test]
    fn test_serializes_camel_case() {
        let child = node("c", Some("r"), "/r/");
        let json = serde_json::to_value(&child).unwrap();
        assert_eq!(json.get("parentKey").unwrap(), "r");
        assert_eq!(json.get("path").unwrap(), "/r/");
        assert!(json.get("order").is_none());
    }
}
