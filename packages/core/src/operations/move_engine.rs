//! Move protocol
//!
//! A move re-reads both nodes, checks the cycle guard, and then inside one
//! store transaction rewrites the parent reference, order, path and depth of
//! the moved node, reorders the affected sibling groups and cascades new paths
//! to every descendant. The caller receives a [`MovedEvent`] describing the
//! result.

use crate::db::{MovedEvent, TreeStore};
use crate::models::{Materialized, NodeKey};
use crate::operations::ordering::OrderAllocator;
use crate::operations::path_codec;
use crate::operations::rebuild::RebuildWalker;
use crate::operations::transactional;
use crate::services::error::{TreeError, TreeResult};

/// Where a node is moved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    Root,
    ChildOf(NodeKey),
    PreviousSiblingOf(NodeKey),
    NextSiblingOf(NodeKey),
}

impl MoveTarget {
    pub fn target_key(&self) -> Option<&str> {
        match self {
            MoveTarget::Root => None,
            MoveTarget::ChildOf(key)
            | MoveTarget::PreviousSiblingOf(key)
            | MoveTarget::NextSiblingOf(key) => Some(key),
        }
    }
}

/// Resolved destination of a move
struct MovePlan<N> {
    parent: Option<N>,
    order: Option<i64>,
}

/// Executes moves against a store
pub struct MoveEngine<'a, S: TreeStore + ?Sized> {
    store: &'a S,
    ordered: bool,
}

impl<'a, S: TreeStore + ?Sized> MoveEngine<'a, S> {
    pub fn new(store: &'a S, ordered: bool) -> Self {
        Self { store, ordered }
    }

    /// Move the node identified by `node_key`
    ///
    /// # Errors
    ///
    /// - `NotFound` when the node, the target or the target's parent is missing
    /// - `MoveNotPossible` when the target is the node or one of its descendants
    /// - `Store` for storage failures; the transaction is rolled back
    pub async fn execute(
        &self,
        node_key: &str,
        target: MoveTarget,
    ) -> TreeResult<MovedEvent<S::Node>> {
        let node = self.fetch(node_key).await?;
        let plan = self.plan(&node, &target).await?;

        let previous_parent = match node.parent_key() {
            Some(parent_key) => self.store.find(parent_key).await?,
            None => None,
        };

        tracing::debug!(
            "Moving node {} ({:?}) from parent {:?}",
            node_key,
            target,
            node.parent_key()
        );

        transactional(self.store, self.apply(node, plan)).await?;

        let model = self.fetch(node_key).await?;
        Ok(MovedEvent::new(model, previous_parent))
    }

    async fn plan(&self, node: &S::Node, target: &MoveTarget) -> TreeResult<MovePlan<S::Node>> {
        // Sibling moves carry the offset from the target's order
        let (target_key, sibling_offset) = match target {
            MoveTarget::Root => {
                let order = self.tentative_order(None, None).await?;
                return Ok(MovePlan {
                    parent: None,
                    order,
                });
            }
            MoveTarget::ChildOf(key) => (key, None),
            MoveTarget::PreviousSiblingOf(key) => (key, Some(0)),
            MoveTarget::NextSiblingOf(key) => (key, Some(1)),
        };

        let target_node = self.fetch(target_key).await?;
        if target_node.is_self_or_descendant_of(node) {
            return Err(TreeError::move_not_possible(node.key(), target_key.as_str()));
        }

        match sibling_offset {
            None => {
                let order = self
                    .tentative_order(Some(target_node.key()), None)
                    .await?;
                Ok(MovePlan {
                    parent: Some(target_node),
                    order,
                })
            }
            Some(offset) => {
                let at = target_node.order().map(|order| order + offset);
                let parent = match target_node.parent_key() {
                    Some(parent_key) => Some(self.fetch(parent_key).await?),
                    None => None,
                };
                let order = self
                    .tentative_order(parent.as_ref().map(|p| p.key()), at)
                    .await?;
                Ok(MovePlan { parent, order })
            }
        }
    }

    /// Order for the moved node, or `None` when ordering is disabled
    ///
    /// A sibling target without an order value appends to the group.
    async fn tentative_order(
        &self,
        parent_key: Option<&str>,
        at: Option<i64>,
    ) -> TreeResult<Option<i64>> {
        if !self.ordered {
            return Ok(None);
        }

        match at {
            Some(order) => Ok(Some(order)),
            None => Ok(Some(
                OrderAllocator::new(self.store).next_order(parent_key).await?,
            )),
        }
    }

    async fn apply(&self, mut node: S::Node, plan: MovePlan<S::Node>) -> TreeResult<()> {
        let old_parent = node.parent_key().map(str::to_string);
        let new_parent = plan.parent.as_ref().map(|p| p.key().to_string());
        let parent_changed = old_parent != new_parent;

        node.set_parent_key(new_parent.clone());
        if plan.order.is_some() {
            node.set_order(plan.order);
        }
        path_codec::apply(&mut node, plan.parent.as_ref());
        self.store.save(&node).await?;

        if let Some(order) = plan.order {
            let allocator = OrderAllocator::new(self.store);
            allocator
                .bump_from(new_parent.as_deref(), order, node.key())
                .await?;
            allocator.renumber_group(new_parent.as_deref()).await?;
            if parent_changed {
                allocator.renumber_group(old_parent.as_deref()).await?;
            }
        }

        if parent_changed {
            RebuildWalker::new(self.store).rebuild(node, false).await?;
        }

        Ok(())
    }

    async fn fetch(&self, key: &str) -> TreeResult<S::Node> {
        self.store
            .find(key)
            .await?
            .ok_or_else(|| TreeError::not_found(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{TreeNode, TreeQuery};
    use crate::operations::path_query::PathQueryBuilder;
    use serde_json::json;

    async fn add(store: &MemoryStore, key: &str, parent: Option<&TreeNode>, order: i64) -> TreeNode {
        let mut node = TreeNode::new_with_key(
            key.to_string(),
            key.to_string(),
            parent.map(|p| p.key.clone()),
            json!({}),
        );
        path_codec::apply(&mut node, parent);
        node.order = Some(order);
        store.insert(node).await.unwrap()
    }

    async fn child_keys(store: &MemoryStore, parent: &TreeNode) -> Vec<(String, i64)> {
        PathQueryBuilder::children(parent)
            .get(store)
            .await
            .unwrap()
            .into_iter()
            .map(|n| (n.key, n.order.unwrap_or_default()))
            .collect()
    }

    #[tokio::test]
    async fn test_previous_sibling_in_same_group() {
        let store = MemoryStore::new();
        let root = add(&store, "root", None, 1).await;
        add(&store, "first", Some(&root), 1).await;
        add(&store, "second", Some(&root), 2).await;
        add(&store, "third", Some(&root), 3).await;

        let event = MoveEngine::new(&store, true)
            .execute("first", MoveTarget::PreviousSiblingOf("third".into()))
            .await
            .unwrap();

        assert_eq!(
            child_keys(&store, &root).await,
            vec![
                ("second".to_string(), 1),
                ("first".to_string(), 2),
                ("third".to_string(), 3)
            ]
        );
        assert!(!event.parent_changed());
        assert_eq!(event.previous_parent_key(), Some("root"));
    }

    #[tokio::test]
    async fn test_child_move_cascades_and_renumbers_old_group() {
        let store = MemoryStore::new();
        let a = add(&store, "a", None, 1).await;
        let b = add(&store, "b", None, 2).await;
        add(&store, "c", None, 3).await;
        add(&store, "b1", Some(&b), 1).await;

        let event = MoveEngine::new(&store, true)
            .execute("b", MoveTarget::ChildOf("a".into()))
            .await
            .unwrap();

        assert_eq!(event.model.path, "/a/");
        assert_eq!(event.model.order, Some(1));
        assert!(event.previous_parent.is_none());

        let b1 = store.find("b1").await.unwrap().unwrap();
        assert_eq!(b1.path, "/a/b/");
        assert_eq!(b1.depth, 2);

        let roots = TreeQuery::new(crate::models::Filter::ParentIs(None))
            .get(&store)
            .await
            .unwrap();
        let roots: Vec<_> = roots.iter().map(|n| (n.key.as_str(), n.order)).collect();
        assert_eq!(roots, vec![("a", Some(1)), ("c", Some(2))]);
        assert_eq!(child_keys(&store, &a).await, vec![("b".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_guard_rejects_descendant_targets() {
        let store = MemoryStore::new();
        let root = add(&store, "root", None, 1).await;
        let child = add(&store, "child", Some(&root), 1).await;
        add(&store, "leaf", Some(&child), 1).await;
        let engine = MoveEngine::new(&store, true);

        for target in [
            MoveTarget::ChildOf("root".into()),
            MoveTarget::ChildOf("leaf".into()),
            MoveTarget::NextSiblingOf("leaf".into()),
        ] {
            let result = engine.execute("root", target).await;
            assert!(matches!(result, Err(TreeError::MoveNotPossible { .. })));
        }

        let unchanged = store.find("root").await.unwrap().unwrap();
        assert_eq!(unchanged, root);
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let store = MemoryStore::new();
        add(&store, "root", None, 1).await;

        let result = MoveEngine::new(&store, true)
            .execute("root", MoveTarget::ChildOf("missing".into()))
            .await;
        assert!(matches!(result, Err(TreeError::NotFound { key }) if key == "missing"));
    }

    #[tokio::test]
    async fn test_unordered_move_leaves_order_alone() {
        let store = MemoryStore::new();
        let mut loose = TreeNode::new_with_key("loose".into(), "loose".into(), None, json!({}));
        loose.order = None;
        store.insert(loose).await.unwrap();
        add(&store, "parent", None, 1).await;

        let event = MoveEngine::new(&store, false)
            .execute("loose", MoveTarget::ChildOf("parent".into()))
            .await
            .unwrap();
        assert_eq!(event.model.order, None);
        assert_eq!(event.model.depth, 1);
    }
}
