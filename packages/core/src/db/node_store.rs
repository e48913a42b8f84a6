//! TreeStore Trait - Storage Abstraction Layer
//!
//! This module defines the `TreeStore` trait, the only way the tree engine talks
//! to persistence. The engine never issues SQL itself: it asks the store for
//! keyed lookups, filtered/ordered queries, single-record saves, an atomic
//! order increment, and transaction boundaries.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked backends
//!    share one interface
//! 2. **Associated Node Type**: Each store persists one `Materialized` entity type
//! 3. **Error Handling**: Uses `anyhow::Result`; storage failures reach callers
//!    untranslated
//! 4. **Transactions**: `begin`/`commit`/`rollback` scope a multi-statement
//!    operation (moves, cascades, renumbering). Scopes nest, so a host can wrap
//!    several engine operations in one transaction of its own
//!
//! # Examples
//!
//! ```rust,no_run
//! use treepath_core::db::{MemoryStore, TreeStore};
//! use treepath_core::models::{Filter, TreeNode, TreeQuery};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryStore::new();
//!     let root = store
//!         .insert(TreeNode::new("Root".to_string(), None, json!({})))
//!         .await?;
//!
//!     let roots = store.query(&TreeQuery::new(Filter::ParentIs(None))).await?;
//!     assert_eq!(roots[0].key, root.key);
//!     Ok(())
//! }
//! ```

use crate::models::{Filter, Materialized, TreeQuery};
use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over the relational store holding the tree
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so services can be shared across tasks.
///
/// # Method Categories
///
/// - **Core CRUD**: find, insert, save, delete
/// - **Querying**: query, count, max_order
/// - **Ordering**: set_order, increment_order
/// - **Transactions**: begin, commit, rollback
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Entity persisted by this store
    type Node: Materialized;

    //
    // CORE CRUD OPERATIONS
    //

    /// Get node by key
    ///
    /// - `Ok(Some(node))` if the node exists
    /// - `Ok(None)` if it doesn't (not an error)
    async fn find(&self, key: &str) -> Result<Option<Self::Node>>;

    /// Insert a new node exactly as given (path, depth and order included)
    ///
    /// # Errors
    ///
    /// - Key already exists
    /// - Parent reference does not resolve (referential integrity)
    async fn insert(&self, node: Self::Node) -> Result<Self::Node>;

    /// Persist every field of an existing node
    ///
    /// # Errors
    ///
    /// Returns error if the node does not exist
    async fn save(&self, node: &Self::Node) -> Result<()>;

    /// Delete a node; descendants go with it (cascading delete)
    ///
    /// Returns the number of removed records. Deleting a missing node is a no-op.
    async fn delete(&self, key: &str) -> Result<u64>;

    //
    // QUERYING
    //

    /// Execute a filtered, ordered query
    async fn query(&self, query: &TreeQuery) -> Result<Vec<Self::Node>>;

    /// Count records matching a filter
    async fn count(&self, filter: &Filter) -> Result<u64>;

    /// Highest order value among records matching a filter (`None` when empty)
    async fn max_order(&self, filter: &Filter) -> Result<Option<i64>>;

    //
    // ORDERING
    //

    /// Write a single order value
    async fn set_order(&self, key: &str, order: i64) -> Result<()>;

    /// `SET order = order + 1` for every record matching the filter
    ///
    /// Returns the number of updated records.
    async fn increment_order(&self, filter: &Filter) -> Result<u64>;

    //
    // TRANSACTIONS
    //

    /// Open a transaction, or a nested scope inside the open one
    async fn begin(&self) -> Result<()>;

    /// Close the innermost scope, keeping its writes
    ///
    /// Writes of a nested scope become durable only when the outermost scope
    /// commits.
    async fn commit(&self) -> Result<()>;

    /// Discard the writes of the innermost scope and close it
    async fn rollback(&self) -> Result<()>;
}
