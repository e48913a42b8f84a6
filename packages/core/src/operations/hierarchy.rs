//! Forest assembly from flat query results
//!
//! Stores return flat, ordered lists. [`to_hierarchy`] links them back into
//! parent→children trees without touching the store, keeping the input order
//! among siblings.

use crate::models::Materialized;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node together with its assembled children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode<T> {
    #[serde(flatten)]
    pub node: T,

    pub children: Vec<HierarchyNode<T>>,
}

impl<T> HierarchyNode<T> {
    pub fn leaf(node: T) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, itself included
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::len).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Pre-order references to every node in the subtree
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let current = stack.pop()?;
            stack.extend(current.children.iter().rev());
            Some(&current.node)
        })
    }

    /// Consume the subtree into a pre-order list
    pub fn flatten(self) -> Vec<T> {
        let mut flat = Vec::new();
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            flat.push(current.node);
            stack.extend(current.children.into_iter().rev());
        }
        flat
    }
}

/// Flatten a whole forest in pre-order
pub fn flatten_forest<T>(forest: Vec<HierarchyNode<T>>) -> Vec<T> {
    forest.into_iter().flat_map(HierarchyNode::flatten).collect()
}

/// Link a flat node list into a forest and return its roots
///
/// - Siblings keep their input order.
/// - A node whose parent is absent from the input becomes a root.
/// - A repeated key replaces the earlier node in the earlier node's position.
/// - Nodes caught in a parent cycle with no root in the input are dropped.
pub fn to_hierarchy<T: Materialized>(nodes: Vec<T>) -> Vec<HierarchyNode<T>> {
    let mut slots: Vec<Option<T>> = Vec::with_capacity(nodes.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(nodes.len());

    for node in nodes {
        match index.get(node.key()) {
            Some(&slot) => slots[slot] = Some(node),
            None => {
                index.insert(node.key().to_string(), slots.len());
                slots.push(Some(node));
            }
        }
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); slots.len()];
    for (slot, node) in slots.iter().enumerate() {
        let parent_slot = node
            .as_ref()
            .and_then(|node| node.parent_key())
            .and_then(|parent_key| index.get(parent_key));

        match parent_slot {
            Some(&parent) => children[parent].push(slot),
            None => roots.push(slot),
        }
    }

    // Pre-order over everything reachable from a root
    let mut order = Vec::with_capacity(slots.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(slot) = stack.pop() {
        order.push(slot);
        stack.extend(children[slot].iter().rev());
    }

    let unreachable = slots.len() - order.len();
    if unreachable > 0 {
        tracing::warn!("Dropped {} nodes whose parent chain never reaches a root", unreachable);
    }

    // Reverse pre-order builds every child before its parent
    let mut built: HashMap<usize, HierarchyNode<T>> = HashMap::with_capacity(order.len());
    for &slot in order.iter().rev() {
        let Some(node) = slots[slot].take() else {
            continue;
        };
        let assembled = children[slot]
            .iter()
            .filter_map(|child| built.remove(child))
            .collect();
        built.insert(
            slot,
            HierarchyNode {
                node,
                children: assembled,
            },
        );
    }

    roots
        .into_iter()
        .filter_map(|slot| built.remove(&slot))
        .collect()
}
