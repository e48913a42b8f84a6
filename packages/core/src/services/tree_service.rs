//! Tree Service - Host-Facing Tree API
//!
//! This module provides the API hosts use to work with a materialized-path tree:
//!
//! - Relationship reads (parent, children, ancestors, descendants, siblings)
//! - Guarded moves that emit a [`MovedEvent`]
//! - Lifecycle hooks that keep path/depth/order correct on ordinary writes
//! - Collection operations (set ancestors/descendants, hierarchy assembly,
//!   renumbering, repair)
//!
//! # Ordering Mode
//!
//! Sibling ordering is a type parameter. `TreeService<S, Ordered>` keeps a dense
//! `1..N` order in every sibling group and exposes the sibling moves;
//! `TreeService<S, Unordered>` leaves order values alone and has no sibling
//! operations at all, so calling one is a compile error rather than a runtime
//! surprise.
//!
//! # Examples
//!
//! ```rust,no_run
//! use treepath_core::db::MemoryStore;
//! use treepath_core::models::TreeNode;
//! use treepath_core::services::TreeService;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = TreeService::ordered(Arc::new(MemoryStore::new()));
//!
//!     let root = service.create(TreeNode::new("Root".into(), None, json!({}))).await?;
//!     let child = service
//!         .create(TreeNode::new("Child".into(), Some(root.key.clone()), json!({})))
//!         .await?;
//!
//!     assert_eq!(child.path, format!("/{}/", root.key));
//!     Ok(())
//! }
//! ```

use crate::db::{MovedEvent, TreeStore};
use crate::models::{validate_key, Materialized, TreeQuery};
use crate::operations::{
    to_hierarchy, transactional, HierarchyNode, MoveEngine, MoveTarget, OrderAllocator,
    PathQueryBuilder, RebuildWalker,
};
use crate::operations::path_codec;
use crate::services::error::{TreeError, TreeResult};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcast channel capacity for move events
///
/// Lagging receivers lose the oldest events first.
const MOVE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Compile-time switch for sibling ordering
pub trait OrderingMode: Send + Sync + 'static {
    const ENABLED: bool;
}

/// Dense `1..N` sibling ordering is maintained
#[derive(Debug, Clone, Copy, Default)]
pub struct Ordered;

/// Order values are never written by the engine
#[derive(Debug, Clone, Copy, Default)]
pub struct Unordered;

impl OrderingMode for Ordered {
    const ENABLED: bool = true;
}

impl OrderingMode for Unordered {
    const ENABLED: bool = false;
}

/// Tree operations over one store
///
/// Cloning is cheap: clones share the store and the move event channel.
pub struct TreeService<S: TreeStore, M: OrderingMode = Ordered> {
    store: Arc<S>,
    move_tx: broadcast::Sender<MovedEvent<S::Node>>,
    _mode: PhantomData<M>,
}

impl<S: TreeStore, M: OrderingMode> Clone for TreeService<S, M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            move_tx: self.move_tx.clone(),
            _mode: PhantomData,
        }
    }
}

impl<S: TreeStore> TreeService<S, Ordered> {
    /// Service that maintains sibling order
    pub fn ordered(store: Arc<S>) -> Self {
        Self::new(store)
    }
}

impl<S: TreeStore> TreeService<S, Unordered> {
    /// Service that never touches order values
    pub fn unordered(store: Arc<S>) -> Self {
        Self::new(store)
    }
}

impl<S: TreeStore, M: OrderingMode> TreeService<S, M> {
    pub fn new(store: Arc<S>) -> Self {
        let (move_tx, _) = broadcast::channel(MOVE_EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            move_tx,
            _mode: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn is_ordered(&self) -> bool {
        M::ENABLED
    }

    /// Subscribe to move events
    ///
    /// Every successful move sends exactly one event, after its transaction
    /// committed. Events sent before subscribing are not replayed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use treepath_core::db::MemoryStore;
    /// # use treepath_core::services::TreeService;
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> anyhow::Result<()> {
    /// let service = TreeService::ordered(Arc::new(MemoryStore::new()));
    /// let mut rx = service.subscribe_to_moves();
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = rx.recv().await {
    ///         println!("moved {:?} away from {:?}", event.model.key, event.previous_parent_key());
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe_to_moves(&self) -> broadcast::Receiver<MovedEvent<S::Node>> {
        self.move_tx.subscribe()
    }

    /// Send a move event; no subscribers is not an error
    fn emit_moved(&self, event: MovedEvent<S::Node>) {
        let _ = self.move_tx.send(event);
    }

    fn engine(&self) -> MoveEngine<'_, S> {
        MoveEngine::new(self.store.as_ref(), M::ENABLED)
    }

    async fn fetch(&self, key: &str) -> TreeResult<S::Node> {
        self.store
            .find(key)
            .await?
            .ok_or_else(|| TreeError::not_found(key))
    }

    async fn run_query(&self, query: TreeQuery) -> TreeResult<Vec<S::Node>> {
        Ok(query.get(self.store.as_ref()).await?)
    }

    //
    // PER-NODE READS
    //

    pub async fn find(&self, key: &str) -> TreeResult<Option<S::Node>> {
        Ok(self.store.find(key).await?)
    }

    /// Stored parent of `node`, `None` for roots
    pub async fn parent(&self, node: &S::Node) -> TreeResult<Option<S::Node>> {
        match node.parent_key() {
            Some(parent_key) => Ok(Some(self.fetch(parent_key).await?)),
            None => Ok(None),
        }
    }

    pub fn children(&self, node: &S::Node) -> TreeQuery {
        PathQueryBuilder::children(node)
    }

    pub async fn get_children(&self, node: &S::Node) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.children(node)).await
    }

    /// Topmost ancestor of `node` (the node itself when it is a root)
    pub async fn get_root(&self, node: &S::Node) -> TreeResult<S::Node> {
        if node.is_root() {
            return Ok(node.clone());
        }

        PathQueryBuilder::root_of(node)
            .first(self.store.as_ref())
            .await?
            .ok_or_else(|| {
                let missing = path_codec::ancestor_keys(node.path())
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| node.key().to_string());
                TreeError::not_found(missing)
            })
    }

    /// Depth computed by walking parent references in the store
    ///
    /// Works for nodes whose cached depth is not yet derived. One lookup per
    /// ancestor.
    pub async fn level(&self, node: &S::Node) -> TreeResult<u32> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node.key().to_string());

        let mut level = 0;
        let mut cursor = node.parent_key().map(str::to_string);
        while let Some(key) = cursor {
            if !visited.insert(key.clone()) {
                tracing::warn!("Parent chain of {} loops at {}", node.key(), key);
                break;
            }
            let parent = self.fetch(&key).await?;
            level += 1;
            cursor = parent.parent_key().map(str::to_string);
        }
        Ok(level)
    }

    pub fn ancestors(&self, node: &S::Node) -> TreeQuery {
        PathQueryBuilder::ancestors(node, false)
    }

    pub async fn get_ancestors(&self, node: &S::Node) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.ancestors(node)).await
    }

    pub fn ancestors_and_self(&self, node: &S::Node) -> TreeQuery {
        PathQueryBuilder::ancestors(node, true)
    }

    pub async fn get_ancestors_and_self(&self, node: &S::Node) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.ancestors_and_self(node)).await
    }

    pub fn descendants(&self, node: &S::Node) -> TreeQuery {
        PathQueryBuilder::descendants(node, false)
    }

    pub async fn get_descendants(&self, node: &S::Node) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.descendants(node)).await
    }

    pub fn descendants_and_self(&self, node: &S::Node) -> TreeQuery {
        PathQueryBuilder::descendants(node, true)
    }

    pub async fn get_descendants_and_self(&self, node: &S::Node) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.descendants_and_self(node)).await
    }

    /// Descendants at most `limit` levels below `node`
    pub async fn get_descendants_limited(
        &self,
        node: &S::Node,
        limit: u32,
    ) -> TreeResult<Vec<S::Node>> {
        self.run_query(PathQueryBuilder::descendants_limited(node, false, limit))
            .await
    }

    pub async fn get_descendants_and_self_limited(
        &self,
        node: &S::Node,
        limit: u32,
    ) -> TreeResult<Vec<S::Node>> {
        self.run_query(PathQueryBuilder::descendants_limited(node, true, limit))
            .await
    }

    pub fn siblings(&self, node: &S::Node) -> TreeQuery {
        PathQueryBuilder::siblings(node, false)
    }

    pub async fn get_siblings(&self, node: &S::Node) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.siblings(node)).await
    }

    pub fn siblings_and_self(&self, node: &S::Node) -> TreeQuery {
        PathQueryBuilder::siblings(node, true)
    }

    pub async fn get_siblings_and_self(&self, node: &S::Node) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.siblings_and_self(node)).await
    }

    //
    // MOVES
    //

    async fn run_move(
        &self,
        node: &S::Node,
        target: MoveTarget,
    ) -> TreeResult<MovedEvent<S::Node>> {
        let event = self.engine().execute(node.key(), target).await?;

        tracing::info!(
            "Moved node {} under {:?} (previous parent {:?})",
            event.model.key(),
            event.model.parent_key(),
            event.previous_parent_key()
        );
        self.emit_moved(event.clone());
        Ok(event)
    }

    /// Detach `node` from its parent
    pub async fn make_root(&self, node: &S::Node) -> TreeResult<MovedEvent<S::Node>> {
        self.run_move(node, MoveTarget::Root).await
    }

    /// Move `node` under `target`, at the end of its children
    ///
    /// # Errors
    ///
    /// - `MoveNotPossible` if `target` is `node` or one of its descendants
    /// - `NotFound` if either node is no longer stored
    pub async fn make_child_of(
        &self,
        node: &S::Node,
        target: &S::Node,
    ) -> TreeResult<MovedEvent<S::Node>> {
        self.make_child_of_key(node, target.key()).await
    }

    /// [`make_child_of`](Self::make_child_of) with only the target's key
    pub async fn make_child_of_key(
        &self,
        node: &S::Node,
        target_key: &str,
    ) -> TreeResult<MovedEvent<S::Node>> {
        self.run_move(node, MoveTarget::ChildOf(target_key.to_string()))
            .await
    }

    /// Re-derive `node`'s path/depth and every descendant's
    ///
    /// Returns the number of visited nodes.
    pub async fn rebuild(&self, node: &S::Node) -> TreeResult<usize> {
        let fresh = self.fetch(node.key()).await?;
        let store = self.store.as_ref();

        let visits = transactional(store, RebuildWalker::new(store).rebuild(fresh, true)).await?;
        tracing::info!("Rebuilt subtree of {} ({} nodes)", node.key(), visits);
        Ok(visits)
    }

    /// Repair every tree in the store
    pub async fn rebuild_all(&self) -> TreeResult<usize> {
        let roots = self.get_roots().await?;
        let store = self.store.as_ref();

        let visits = transactional(store, async {
            let walker = RebuildWalker::new(store);
            let mut visits = 0;
            for root in roots {
                visits += walker.rebuild(root, true).await?;
            }
            Ok(visits)
        })
        .await?;

        tracing::info!("Rebuilt all trees ({} nodes)", visits);
        Ok(visits)
    }

    //
    // COLLECTION OPERATIONS
    //

    pub fn roots(&self) -> TreeQuery {
        PathQueryBuilder::roots()
    }

    pub async fn get_roots(&self) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.roots()).await
    }

    /// First root by order
    pub async fn root(&self) -> TreeResult<Option<S::Node>> {
        Ok(self.roots().first(self.store.as_ref()).await?)
    }

    pub fn all(&self) -> TreeQuery {
        PathQueryBuilder::all()
    }

    pub async fn get_all(&self) -> TreeResult<Vec<S::Node>> {
        self.run_query(self.all()).await
    }

    /// Link `nodes` into a forest; see [`to_hierarchy`]
    pub fn to_hierarchy(&self, nodes: Vec<S::Node>) -> Vec<HierarchyNode<S::Node>> {
        to_hierarchy(nodes)
    }

    /// The whole store as a forest, siblings in order
    pub async fn get_hierarchy(&self) -> TreeResult<Vec<HierarchyNode<S::Node>>> {
        Ok(to_hierarchy(self.get_all().await?))
    }

    /// Ancestors of any node in `nodes`, excluding the members themselves
    pub async fn get_ancestors_of_set(&self, nodes: &[S::Node]) -> TreeResult<Vec<S::Node>> {
        self.run_query(PathQueryBuilder::ancestors_of_set(nodes, false))
            .await
    }

    pub async fn get_ancestors_and_selves(&self, nodes: &[S::Node]) -> TreeResult<Vec<S::Node>> {
        self.run_query(PathQueryBuilder::ancestors_of_set(nodes, true))
            .await
    }

    pub async fn get_descendants_of_set(&self, nodes: &[S::Node]) -> TreeResult<Vec<S::Node>> {
        self.run_query(PathQueryBuilder::descendants_of_set(nodes, false))
            .await
    }

    pub async fn get_descendants_and_selves(
        &self,
        nodes: &[S::Node],
    ) -> TreeResult<Vec<S::Node>> {
        self.run_query(PathQueryBuilder::descendants_of_set(nodes, true))
            .await
    }

    //
    // LIFECYCLE HOOKS
    //

    /// Prepare a node that is about to be inserted
    ///
    /// When ordered, the node is appended to its sibling group. Then path and
    /// depth are derived as in [`prepare_save`](Self::prepare_save).
    pub async fn prepare_create(&self, node: &mut S::Node) -> TreeResult<()> {
        if M::ENABLED {
            let order = OrderAllocator::new(self.store.as_ref())
                .next_order(node.parent_key())
                .await?;
            node.set_order(Some(order));
        }
        self.prepare_save(node).await
    }

    /// Derive path and depth from the stored parent
    ///
    /// # Errors
    ///
    /// - `Validation` if the key cannot be embedded in a path
    /// - `NotFound` if the parent reference does not resolve
    pub async fn prepare_save(&self, node: &mut S::Node) -> TreeResult<()> {
        validate_key(node.key())?;
        let parent = self.parent(node).await?;
        path_codec::apply(node, parent.as_ref());
        Ok(())
    }

    /// Cascade new paths below `node` if its parent changed
    ///
    /// Returns the number of visited nodes (0 when nothing changed).
    pub async fn finish_save(
        &self,
        node: &S::Node,
        previous_parent_key: Option<&str>,
    ) -> TreeResult<usize> {
        if node.parent_key() == previous_parent_key {
            return Ok(0);
        }
        RebuildWalker::new(self.store.as_ref())
            .rebuild(node.clone(), false)
            .await
    }

    /// Insert a new node with derived path, depth and (when ordered) order
    pub async fn create(&self, mut node: S::Node) -> TreeResult<S::Node> {
        self.prepare_create(&mut node).await?;
        let created = self.store.insert(node).await?;

        tracing::debug!(
            "Created node {} at depth {} (order {:?})",
            created.key(),
            created.depth(),
            created.order()
        );
        Ok(created)
    }

    /// Persist an existing node, keeping the tree consistent
    ///
    /// A changed parent reference is treated like a move: reparenting into the
    /// node's own subtree fails with `MoveNotPossible`, the node is appended to
    /// its new sibling group, the old group is closed up, and descendants get
    /// new paths. No move event is emitted. When ordered, the caller's `order`
    /// is ignored: an unchanged parent keeps the stored position.
    pub async fn save(&self, mut node: S::Node) -> TreeResult<S::Node> {
        let stored = self.fetch(node.key()).await?;
        let previous_parent_key = stored.parent_key().map(str::to_string);
        let parent_changed = node.parent_key() != previous_parent_key.as_deref();

        if parent_changed {
            if let Some(parent_key) = node.parent_key() {
                let parent = self.fetch(parent_key).await?;
                if parent.is_self_or_descendant_of(&stored) {
                    return Err(TreeError::move_not_possible(node.key(), parent_key));
                }
            }
        }

        let store = self.store.as_ref();
        let saved = transactional(store, async {
            let allocator = OrderAllocator::new(store);
            if M::ENABLED && parent_changed {
                let order = allocator.next_order(node.parent_key()).await?;
                node.set_order(Some(order));
            } else if M::ENABLED {
                // Sibling order belongs to the engine; a stale copy must not overwrite it
                node.set_order(stored.order());
            }

            self.prepare_save(&mut node).await?;
            store.save(&node).await?;

            if M::ENABLED && parent_changed {
                allocator
                    .renumber_group(previous_parent_key.as_deref())
                    .await?;
            }
            self.finish_save(&node, previous_parent_key.as_deref())
                .await?;
            Ok(node)
        })
        .await?;

        tracing::debug!("Saved node {}", saved.key());
        Ok(saved)
    }

    /// Delete a node; its subtree goes with it
    ///
    /// When ordered, the remaining siblings of the stored node are renumbered,
    /// whatever parent the passed copy still carries. A missing node deletes
    /// nothing.
    pub async fn delete(&self, node: &S::Node) -> TreeResult<u64> {
        let store = self.store.as_ref();
        let removed = transactional(store, async {
            let Some(stored) = store.find(node.key()).await? else {
                return Ok(0);
            };
            let removed = store.delete(stored.key()).await?;
            if M::ENABLED && removed > 0 {
                OrderAllocator::new(store)
                    .renumber_group(stored.parent_key())
                    .await?;
            }
            Ok(removed)
        })
        .await?;

        tracing::debug!("Deleted {} nodes under {}", removed, node.key());
        Ok(removed)
    }
}

impl<S: TreeStore> TreeService<S, Ordered> {
    /// Nearest sibling ordered before `node`
    pub async fn previous_sibling(&self, node: &S::Node) -> TreeResult<Option<S::Node>> {
        match PathQueryBuilder::previous_sibling(node) {
            Some(query) => Ok(query.first(self.store.as_ref()).await?),
            None => Ok(None),
        }
    }

    /// Nearest sibling ordered after `node`
    pub async fn next_sibling(&self, node: &S::Node) -> TreeResult<Option<S::Node>> {
        match PathQueryBuilder::next_sibling(node) {
            Some(query) => Ok(query.first(self.store.as_ref()).await?),
            None => Ok(None),
        }
    }

    /// Place `node` directly before `target`, under `target`'s parent
    pub async fn make_previous_sibling_of(
        &self,
        node: &S::Node,
        target: &S::Node,
    ) -> TreeResult<MovedEvent<S::Node>> {
        self.run_move(node, MoveTarget::PreviousSiblingOf(target.key().to_string()))
            .await
    }

    /// Place `node` directly after `target`, under `target`'s parent
    pub async fn make_next_sibling_of(
        &self,
        node: &S::Node,
        target: &S::Node,
    ) -> TreeResult<MovedEvent<S::Node>> {
        self.run_move(node, MoveTarget::NextSiblingOf(target.key().to_string()))
            .await
    }

    /// Same as [`make_next_sibling_of`](Self::make_next_sibling_of)
    pub async fn make_sibling_of(
        &self,
        node: &S::Node,
        target: &S::Node,
    ) -> TreeResult<MovedEvent<S::Node>> {
        self.make_next_sibling_of(node, target).await
    }

    /// Restore `1..N` in one sibling group (`None` for the roots)
    ///
    /// Returns the number of rewritten order values.
    pub async fn renumber(&self, parent_key: Option<&str>) -> TreeResult<usize> {
        let store = self.store.as_ref();
        let writes = transactional(store, async {
            Ok(OrderAllocator::new(store).renumber_group(parent_key).await?)
        })
        .await?;

        if writes > 0 {
            tracing::info!("Renumbered {} siblings under {:?}", writes, parent_key);
        }
        Ok(writes)
    }
}
