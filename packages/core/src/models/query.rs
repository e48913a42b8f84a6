//! Query Types
//!
//! `Filter` is a small predicate tree that every store can evaluate: the
//! in-memory store matches it directly, the SQLite store renders it into a
//! parameterized `WHERE` clause. `TreeQuery` pairs a filter with ordering and
//! an optional limit and is only executed when one of its `get`/`first`/`count`
//! methods is awaited.
//!
//! # Examples
//!
//! ```rust
//! use treepath_core::models::{Filter, TreeQuery};
//!
//! // Roots except one, ordered by sibling rank
//! let query = TreeQuery::new(Filter::ParentIs(None)).without_node("node-123");
//! assert!(matches!(query.filter, Filter::And(_)));
//! ```

use crate::db::TreeStore;
use crate::models::{Materialized, NodeKey};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Predicate over tree records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum Filter {
    /// Matches every record
    All,
    KeyEq(NodeKey),
    KeyNe(NodeKey),
    /// Empty set matches nothing
    KeyIn(Vec<NodeKey>),
    /// Empty set matches everything
    KeyNotIn(Vec<NodeKey>),
    /// `None` selects roots
    ParentIs(Option<NodeKey>),
    /// Path starts with the given prefix
    PathPrefix(String),
    /// Inclusive depth range
    DepthBetween(u32, u32),
    OrderAtLeast(i64),
    OrderBelow(i64),
    OrderAbove(i64),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Conjunction that flattens nested `And`s and drops `All`
    pub fn and(self, other: Filter) -> Filter {
        let mut parts = Vec::new();
        for filter in [self, other] {
            match filter {
                Filter::All => {}
                Filter::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }

        match parts.len() {
            0 => Filter::All,
            1 => parts.remove(0),
            _ => Filter::And(parts),
        }
    }

    /// Disjunction that flattens nested `Or`s
    pub fn or(self, other: Filter) -> Filter {
        if matches!(self, Filter::All) || matches!(other, Filter::All) {
            return Filter::All;
        }

        let mut parts = Vec::new();
        for filter in [self, other] {
            match filter {
                Filter::Or(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        Filter::Or(parts)
    }

    /// Evaluate the predicate against a record
    ///
    /// Order comparisons never match records without an order value, mirroring
    /// SQL's NULL semantics.
    pub fn matches<T: Materialized>(&self, node: &T) -> bool {
        match self {
            Filter::All => true,
            Filter::KeyEq(key) => node.key() == key,
            Filter::KeyNe(key) => node.key() != key,
            Filter::KeyIn(keys) => keys.iter().any(|k| k == node.key()),
            Filter::KeyNotIn(keys) => !keys.iter().any(|k| k == node.key()),
            Filter::ParentIs(parent) => node.parent_key() == parent.as_deref(),
            Filter::PathPrefix(prefix) => node.path().starts_with(prefix.as_str()),
            Filter::DepthBetween(min, max) => (*min..=*max).contains(&node.depth()),
            Filter::OrderAtLeast(n) => node.order().is_some_and(|o| o >= *n),
            Filter::OrderBelow(n) => node.order().is_some_and(|o| o < *n),
            Filter::OrderAbove(n) => node.order().is_some_and(|o| o > *n),
            Filter::And(parts) => parts.iter().all(|f| f.matches(node)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(node)),
        }
    }
}

/// Column used for sorting query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Order,
    Depth,
    Path,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Sort order for query results
///
/// Ties are always broken by the order field, then name, then key, so results
/// are deterministic for every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field: SortField,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }

    /// Compare two records under this sort order
    ///
    /// `name` is supplied separately because it is not part of the
    /// `Materialized` capability.
    pub fn compare<T: Materialized>(&self, a: (&T, &str), b: (&T, &str)) -> Ordering {
        let (left, left_name) = a;
        let (right, right_name) = b;

        let primary = match self.field {
            SortField::Order => Ordering::Equal,
            SortField::Depth => left.depth().cmp(&right.depth()),
            SortField::Path => left.path().cmp(right.path()),
            SortField::Key => left.key().cmp(right.key()),
        };

        let ordering = primary
            .then_with(|| left.order().cmp(&right.order()))
            .then_with(|| left_name.cmp(right_name))
            .then_with(|| left.key().cmp(right.key()));

        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::asc(SortField::Order)
    }
}

/// A filter plus ordering, executed lazily against a store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuery {
    pub filter: Filter,

    pub order_by: OrderBy,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

impl TreeQuery {
    /// Query with the default ordering (order field, ascending)
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            order_by: OrderBy::default(),
            limit: None,
        }
    }

    /// Every record in the store
    pub fn all() -> Self {
        Self::new(Filter::All)
    }

    /// Narrow the query with an extra conjunctive predicate
    pub fn and(mut self, filter: Filter) -> Self {
        self.filter = self.filter.and(filter);
        self
    }

    /// Exclude a single node
    pub fn without_node(self, key: impl Into<NodeKey>) -> Self {
        self.and(Filter::KeyNe(key.into()))
    }

    /// Exclude a set of nodes
    pub fn without_nodes<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<NodeKey>,
    {
        self.and(Filter::KeyNotIn(keys.into_iter().map(Into::into).collect()))
    }

    /// Restrict results to depths between `depth` and `depth + limit`
    ///
    /// A negative limit selects levels above `depth` (useful with ancestor
    /// queries), a positive one levels below it.
    pub fn limit_depth(self, depth: u32, limit: i64) -> Self {
        let current = i64::from(depth);
        let other = current.saturating_add(limit);
        let min = current.min(other).max(0);
        let max = current.max(other).max(0);
        let clamp = |value: i64| u32::try_from(value).unwrap_or(u32::MAX);

        self.and(Filter::DepthBetween(clamp(min), clamp(max)))
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Execute and return every matching record
    pub async fn get<S: TreeStore + ?Sized>(&self, store: &S) -> Result<Vec<S::Node>> {
        store.query(self).await
    }

    /// Execute and return the first matching record
    pub async fn first<S: TreeStore + ?Sized>(&self, store: &S) -> Result<Option<S::Node>> {
        let limited = self.clone().with_limit(1);
        Ok(store.query(&limited).await?.into_iter().next())
    }

    /// Count matching records (ordering and limit are ignored)
    pub async fn count<S: TreeStore + ?Sized>(&self, store: &S) -> Result<u64> {
        store.count(&self.filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TreeNode;
    use serde_json::json;

    fn node(key: &str, parent: Option<&str>, path: &str, depth: u32, order: Option<i64>) -> TreeNode {
        let mut node = TreeNode::new_with_key(
            key.to_string(),
            key.to_string(),
            parent.map(str::to_string),
            json!({}),
        );
        node.path = path.to_string();
        node.depth = depth;
        node.order = order;
        node
    }

    #[test]
    fn test_and_flattens_and_drops_all() {
        let filter = Filter::All
            .and(Filter::KeyEq("a".into()))
            .and(Filter::KeyNe("b".into()).and(Filter::DepthBetween(0, 1)));

        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::KeyEq("a".into()),
                Filter::KeyNe("b".into()),
                Filter::DepthBetween(0, 1),
            ])
        );
        assert_eq!(Filter::All.and(Filter::All), Filter::All);
    }

    #[test]
    fn test_or_with_all_matches_everything() {
        assert_eq!(Filter::KeyEq("a".into()).or(Filter::All), Filter::All);
    }

    #[test]
    fn test_matches_path_and_order_predicates() {
        let child = node("c", Some("r"), "/r/", 1, Some(2));
        let unordered = node("u", Some("r"), "/r/", 1, None);

        assert!(Filter::PathPrefix("/r/".into()).matches(&child));
        assert!(!Filter::PathPrefix("/x/".into()).matches(&child));
        assert!(Filter::ParentIs(Some("r".into())).matches(&child));
        assert!(!Filter::ParentIs(None).matches(&child));
        assert!(Filter::OrderAtLeast(2).matches(&child));
        assert!(!Filter::OrderAbove(2).matches(&child));
        assert!(!Filter::OrderAtLeast(0).matches(&unordered));
        assert!(!Filter::KeyIn(vec![]).matches(&child));
        assert!(Filter::KeyNotIn(vec![]).matches(&child));
    }

    #[test]
    fn test_limit_depth_handles_negative_limits() {
        let query = TreeQuery::all().limit_depth(3, -2);
        assert_eq!(query.filter, Filter::DepthBetween(1, 3));

        let query = TreeQuery::all().limit_depth(1, -5);
        assert_eq!(query.filter, Filter::DepthBetween(0, 1));

        let query = TreeQuery::all().limit_depth(1, 2);
        assert_eq!(query.filter, Filter::DepthBetween(1, 3));
    }

    #[test]
    fn test_order_by_breaks_ties_by_name_then_key() {
        let a = node("a", None, "", 0, Some(1));
        let b = node("b", None, "", 0, Some(1));
        let c = node("c", None, "", 0, Some(0));

        let order = OrderBy::default();
        assert_eq!(order.compare((&a, "x"), (&b, "y")), Ordering::Less);
        assert_eq!(order.compare((&a, "z"), (&b, "y")), Ordering::Greater);
        assert_eq!(order.compare((&a, "x"), (&c, "x")), Ordering::Greater);
        assert_eq!(
            OrderBy::desc(SortField::Order).compare((&a, "x"), (&c, "x")),
            Ordering::Less
        );
    }
}
