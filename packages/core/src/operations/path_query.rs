//! Relationship queries over materialized paths
//!
//! Every tree relationship is expressed as a [`Filter`] over key, parent, path
//! and depth, so a store can answer it with indexed lookups instead of walking
//! parent references.

use crate::models::{Filter, Materialized, NodeKey, OrderBy, SortField, TreeQuery};
use crate::operations::path_codec;
use std::collections::BTreeSet;

/// Builds relationship filters and queries for one node or a set of nodes
pub struct PathQueryBuilder;

impl PathQueryBuilder {
    //
    // FILTERS
    //

    /// Strict descendants: the path starts with the node's lineage
    pub fn descendants_filter<T: Materialized>(node: &T, include_self: bool) -> Filter {
        let prefix = Filter::PathPrefix(path_codec::lineage(node));
        if include_self {
            prefix.or(Filter::KeyEq(node.key().to_string()))
        } else {
            prefix
        }
    }

    /// Ancestors: keys listed in the node's own path
    pub fn ancestors_filter<T: Materialized>(node: &T, include_self: bool) -> Filter {
        let mut keys = path_codec::ancestor_keys(node.path());
        if include_self {
            keys.push(node.key().to_string());
        }
        Filter::KeyIn(keys)
    }

    /// Descendants of any member of `nodes`
    pub fn descendants_of_set_filter<T: Materialized>(nodes: &[T], include_selves: bool) -> Filter {
        let mut parts: Vec<Filter> = nodes
            .iter()
            .map(|node| Filter::PathPrefix(path_codec::lineage(node)))
            .collect();

        if include_selves && !nodes.is_empty() {
            parts.push(Filter::KeyIn(Self::keys_of(nodes)));
        }
        Filter::Or(parts)
    }

    /// Ancestors of any member of `nodes`
    ///
    /// Without selves, members that are ancestors of other members are still
    /// excluded.
    pub fn ancestors_of_set_filter<T: Materialized>(nodes: &[T], include_selves: bool) -> Filter {
        let mut keys: BTreeSet<NodeKey> = nodes
            .iter()
            .flat_map(|node| path_codec::ancestor_keys(node.path()))
            .collect();

        if include_selves {
            keys.extend(nodes.iter().map(|node| node.key().to_string()));
            Filter::KeyIn(keys.into_iter().collect())
        } else {
            Filter::KeyIn(keys.into_iter().collect()).and(Filter::KeyNotIn(Self::keys_of(nodes)))
        }
    }

    /// Nodes sharing the node's parent
    pub fn siblings_filter<T: Materialized>(node: &T, include_self: bool) -> Filter {
        let group = Filter::ParentIs(node.parent_key().map(str::to_string));
        if include_self {
            group
        } else {
            group.and(Filter::KeyNe(node.key().to_string()))
        }
    }

    /// Sibling group of a parent (`None` for roots)
    pub fn group_filter(parent_key: Option<&str>) -> Filter {
        Filter::ParentIs(parent_key.map(str::to_string))
    }

    /// Depth slice between `depth` and `depth + limit`, clamped at zero
    pub fn depth_filter(depth: u32, limit: i64) -> Filter {
        TreeQuery::all().limit_depth(depth, limit).filter
    }

    //
    // QUERIES
    //

    pub fn all() -> TreeQuery {
        TreeQuery::all()
    }

    pub fn roots() -> TreeQuery {
        TreeQuery::new(Filter::ParentIs(None))
    }

    pub fn children<T: Materialized>(node: &T) -> TreeQuery {
        TreeQuery::new(Filter::ParentIs(Some(node.key().to_string())))
    }

    pub fn descendants<T: Materialized>(node: &T, include_self: bool) -> TreeQuery {
        TreeQuery::new(Self::descendants_filter(node, include_self))
    }

    /// Descendants at most `limit` levels below the node
    pub fn descendants_limited<T: Materialized>(
        node: &T,
        include_self: bool,
        limit: u32,
    ) -> TreeQuery {
        Self::descendants(node, include_self).limit_depth(node.depth(), i64::from(limit))
    }

    pub fn ancestors<T: Materialized>(node: &T, include_self: bool) -> TreeQuery {
        TreeQuery::new(Self::ancestors_filter(node, include_self))
    }

    pub fn descendants_of_set<T: Materialized>(nodes: &[T], include_selves: bool) -> TreeQuery {
        TreeQuery::new(Self::descendants_of_set_filter(nodes, include_selves))
    }

    pub fn ancestors_of_set<T: Materialized>(nodes: &[T], include_selves: bool) -> TreeQuery {
        TreeQuery::new(Self::ancestors_of_set_filter(nodes, include_selves))
    }

    pub fn siblings<T: Materialized>(node: &T, include_self: bool) -> TreeQuery {
        TreeQuery::new(Self::siblings_filter(node, include_self))
    }

    /// Nearest sibling ranked before the node
    pub fn previous_sibling<T: Materialized>(node: &T) -> Option<TreeQuery> {
        let order = node.order()?;
        Some(
            Self::siblings(node, false)
                .and(Filter::OrderBelow(order))
                .order_by(OrderBy::desc(SortField::Order))
                .with_limit(1),
        )
    }

    /// Nearest sibling ranked after the node
    pub fn next_sibling<T: Materialized>(node: &T) -> Option<TreeQuery> {
        let order = node.order()?;
        Some(
            Self::siblings(node, false)
                .and(Filter::OrderAbove(order))
                .order_by(OrderBy::asc(SortField::Order))
                .with_limit(1),
        )
    }

    /// The topmost ancestor of the node, or the node itself when it is a root
    pub fn root_of<T: Materialized>(node: &T) -> TreeQuery {
        Self::ancestors(node, true)
            .and(Filter::ParentIs(None))
            .with_limit(1)
    }

    fn keys_of<T: Materialized>(nodes: &[T]) -> Vec<NodeKey> {
        nodes.iter().map(|node| node.key().to_string()).collect()
    }
}
