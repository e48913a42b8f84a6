//! In-memory TreeStore
//!
//! Keeps `TreeNode`s in a map behind a tokio `RwLock`. It enforces the same
//! integrity rules the SQLite schema does (unique keys, parent references must
//! resolve, deleting a node deletes its subtree). Every `begin` pushes a
//! snapshot, so transactions nest: `rollback` restores the innermost snapshot
//! and `commit` folds the innermost scope into the enclosing one.
//!
//! The store is meant for a single task. A rollback restores the whole map, so
//! writes that another task makes while a transaction is open are discarded
//! with it.

use crate::db::TreeStore;
use crate::models::{Filter, Materialized, TreeNode, TreeQuery};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    nodes: HashMap<String, TreeNode>,
    /// One snapshot per open transaction, innermost last
    snapshots: Vec<HashMap<String, TreeNode>>,
}

impl MemoryState {
    fn check_parent(&self, node: &TreeNode) -> Result<()> {
        match node.parent_key.as_deref() {
            Some(parent_key) if !self.nodes.contains_key(parent_key) => bail!(
                "FOREIGN KEY constraint failed: parent {} of node {} does not exist",
                parent_key,
                node.key
            ),
            _ => Ok(()),
        }
    }

    fn matching(&self, filter: &Filter) -> impl Iterator<Item = &TreeNode> {
        let filter = filter.clone();
        self.nodes.values().filter(move |node| filter.matches(*node))
    }
}

/// Store backed by a `HashMap`, for tests and database-free hosts
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    pub async fn len(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// True while a transaction is open
    pub async fn in_transaction(&self) -> bool {
        self.transaction_depth().await > 0
    }

    /// Number of open, nested transactions
    pub async fn transaction_depth(&self) -> usize {
        self.state.read().await.snapshots.len()
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    type Node = TreeNode;

    async fn find(&self, key: &str) -> Result<Option<TreeNode>> {
        Ok(self.state.read().await.nodes.get(key).cloned())
    }

    async fn insert(&self, node: TreeNode) -> Result<TreeNode> {
        let mut state = self.state.write().await;
        if state.nodes.contains_key(&node.key) {
            bail!("UNIQUE constraint failed: node {} already exists", node.key);
        }
        state.check_parent(&node)?;

        state.nodes.insert(node.key.clone(), node.clone());
        Ok(node)
    }

    async fn save(&self, node: &TreeNode) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&node.key) {
            bail!("Node {} does not exist", node.key);
        }
        state.check_parent(node)?;

        state.nodes.insert(node.key.clone(), node.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(key) {
            return Ok(0);
        }

        // Follow parent references rather than paths, like ON DELETE CASCADE
        let mut doomed = vec![key.to_string()];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let parent = doomed[cursor].as_str();
            let children: Vec<String> = state
                .nodes
                .values()
                .filter(|node| node.parent_key.as_deref() == Some(parent))
                .filter(|node| !doomed.contains(&node.key))
                .map(|node| node.key.clone())
                .collect();
            doomed.extend(children);
            cursor += 1;
        }

        for key in &doomed {
            state.nodes.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn query(&self, query: &TreeQuery) -> Result<Vec<TreeNode>> {
        let state = self.state.read().await;
        let mut results: Vec<TreeNode> = state.matching(&query.filter).cloned().collect();

        results.sort_by(|a, b| {
            query
                .order_by
                .compare((a, a.name.as_str()), (b, b.name.as_str()))
        });
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        Ok(self.state.read().await.matching(filter).count() as u64)
    }

    async fn max_order(&self, filter: &Filter) -> Result<Option<i64>> {
        Ok(self
            .state
            .read()
            .await
            .matching(filter)
            .filter_map(|node| node.order())
            .max())
    }

    async fn set_order(&self, key: &str, order: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(key)
            .ok_or_else(|| anyhow!("Node {} does not exist", key))?;
        node.order = Some(order);
        Ok(())
    }

    async fn increment_order(&self, filter: &Filter) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for node in state.nodes.values_mut() {
            if filter.matches(&*node) {
                if let Some(order) = node.order.as_mut() {
                    *order += 1;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn begin(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let snapshot = state.nodes.clone();
        state.snapshots.push(snapshot);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.snapshots.pop().is_none() {
            bail!("cannot commit - no transaction is active");
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let snapshot = state
            .snapshots
            .pop()
            .ok_or_else(|| anyhow!("cannot rollback - no transaction is active"))?;
        state.nodes = snapshot;
        Ok(())
    }
}
