//! Subtree path/depth reconstruction
//!
//! Used as the cascade after a parent change and as a repair tool for data
//! whose paths were written outside the engine.

use crate::db::TreeStore;
use crate::models::Materialized;
use crate::operations::path_codec;
use crate::operations::path_query::PathQueryBuilder;
use crate::services::error::{TreeError, TreeResult};
use std::collections::HashSet;

/// Depth-first walker that re-derives path and depth below a node
pub struct RebuildWalker<'a, S: TreeStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TreeStore + ?Sized> RebuildWalker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Rebuild `node`'s subtree and return the number of visited nodes
    ///
    /// With `persist_self` the node's own path and depth are first re-derived
    /// from its stored parent. Children are always re-derived from the parent in
    /// hand, so each level costs one children query. Only changed values are
    /// written.
    pub async fn rebuild(&self, node: S::Node, persist_self: bool) -> TreeResult<usize> {
        let mut start = node;
        if persist_self {
            let parent = self.load_parent(&start).await?;
            if path_codec::apply(&mut start, parent.as_ref()) {
                self.store.save(&start).await?;
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![start];
        let mut visits = 0;
        let mut writes = 0;

        while let Some(current) = stack.pop() {
            if !visited.insert(current.key().to_string()) {
                tracing::warn!(
                    "Skipping node {} during rebuild: already visited (corrupt parent chain)",
                    current.key()
                );
                continue;
            }
            visits += 1;

            let children = PathQueryBuilder::children(&current).get(self.store).await?;

            // Reversed so the stack pops siblings in ascending order
            for mut child in children.into_iter().rev() {
                if visited.contains(child.key()) {
                    tracing::warn!(
                        "Node {} is its own ancestor; leaving its path untouched",
                        child.key()
                    );
                    continue;
                }

                if path_codec::apply(&mut child, Some(&current)) {
                    self.store.save(&child).await?;
                    writes += 1;
                }
                stack.push(child);
            }
        }

        tracing::debug!("Rebuild visited {} nodes, rewrote {}", visits, writes);
        Ok(visits)
    }

    async fn load_parent(&self, node: &S::Node) -> TreeResult<Option<S::Node>> {
        match node.parent_key() {
            None => Ok(None),
            Some(parent_key) => self
                .store
                .find(parent_key)
                .await?
                .map(Some)
                .ok_or_else(|| TreeError::not_found(parent_key)),
        }
    }
}
