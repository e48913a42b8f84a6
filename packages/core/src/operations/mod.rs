//! Tree Operations
//!
//! The engine behind `TreeService`, leaves first:
//!
//! - [`path_codec`] - derive path and depth from a parent
//! - [`ordering`] - dense sibling ordering (`OrderAllocator`)
//! - [`path_query`] - relationship filters and queries (`PathQueryBuilder`)
//! - [`rebuild`] - subtree path/depth reconstruction (`RebuildWalker`)
//! - [`move_engine`] - guarded, transactional moves (`MoveEngine`)
//! - [`hierarchy`] - forest assembly from flat results
//!
//! Operations never open transactions of their own except `MoveEngine`;
//! callers wrap multi-step writes with [`transactional`]. Store transactions
//! nest, so a host may wrap several engine calls in its own `begin` and
//! `commit` (or `rollback`) and the engine's scopes become savepoints.

pub mod hierarchy;
pub mod move_engine;
pub mod ordering;
pub mod path_codec;
pub mod path_query;
pub mod rebuild;

pub use hierarchy::{flatten_forest, to_hierarchy, HierarchyNode};
pub use move_engine::{MoveEngine, MoveTarget};
pub use ordering::OrderAllocator;
pub use path_query::PathQueryBuilder;
pub use rebuild::RebuildWalker;

use crate::db::TreeStore;
use crate::services::error::TreeResult;
use std::future::Future;

/// Run `work` between `begin` and `commit`, rolling back on error
///
/// `work` is not polled until the transaction has begun. A failed rollback is
/// logged and the original error is returned.
pub async fn transactional<S, F, T>(store: &S, work: F) -> TreeResult<T>
where
    S: TreeStore + ?Sized,
    F: Future<Output = TreeResult<T>>,
{
    store.begin().await?;

    match work.await {
        Ok(value) => {
            store.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = store.rollback().await {
                tracing::warn!("Rollback failed after {}: {}", error, rollback_error);
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::TreeNode;
    use crate::services::error::TreeError;
    use serde_json::json;

    #[tokio::test]
    async fn test_failed_work_is_rolled_back() {
        let store = MemoryStore::new();

        let result: TreeResult<()> = transactional(&store, async {
            store
                .insert(TreeNode::new_with_key("a".into(), "a".into(), None, json!({})))
                .await?;
            Err(TreeError::not_found("b"))
        })
        .await;

        assert!(result.is_err());
        assert!(store.find("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_successful_work_is_committed() {
        let store = MemoryStore::new();

        let inserted = transactional(&store, async {
            Ok(store
                .insert(TreeNode::new_with_key("a".into(), "a".into(), None, json!({})))
                .await?)
        })
        .await
        .unwrap();

        assert_eq!(store.find("a").await.unwrap(), Some(inserted));
    }
}
