//! Shared helpers for integration tests

#![allow(dead_code)]

use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use treepath_core::config::TreeConfig;
use treepath_core::db::SqliteStore;
use treepath_core::models::TreeNode;
use treepath_core::services::{Ordered, OrderingMode, TreeService, Unordered};

static TRACING: Once = Once::new();

/// Route engine logs to the test writer (filter with RUST_LOG)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

async fn open_store() -> Result<(Arc<SqliteStore>, TempDir)> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("tree.db");
    let store = SqliteStore::open(db_path, TreeConfig::default()).await?;
    Ok((Arc::new(store), temp_dir))
}

/// Ordered service over a fresh database file
pub async fn create_ordered_service() -> Result<(TreeService<SqliteStore, Ordered>, TempDir)> {
    let (store, temp_dir) = open_store().await?;
    Ok((TreeService::ordered(store), temp_dir))
}

/// Unordered service over a fresh database file
pub async fn create_unordered_service() -> Result<(TreeService<SqliteStore, Unordered>, TempDir)>
{
    let (store, temp_dir) = open_store().await?;
    Ok((TreeService::unordered(store), temp_dir))
}

/// Create a node named `name` under `parent`
pub async fn create_node<M: OrderingMode>(
    service: &TreeService<SqliteStore, M>,
    name: &str,
    parent: Option<&TreeNode>,
) -> Result<TreeNode> {
    let node = TreeNode::new(
        name.to_string(),
        parent.map(|p| p.key.clone()),
        json!({}),
    );
    Ok(service.create(node).await?)
}

/// Re-read a node from the store
pub async fn refresh<M: OrderingMode>(
    service: &TreeService<SqliteStore, M>,
    node: &TreeNode,
) -> Result<TreeNode> {
    service
        .find(&node.key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("node {} disappeared", node.key))
}

/// Keys of `nodes`, sorted, for order-insensitive comparisons
pub fn sorted_keys(nodes: &[TreeNode]) -> Vec<String> {
    let mut keys: Vec<String> = nodes.iter().map(|n| n.key.clone()).collect();
    keys.sort();
    keys
}
