//! Dense sibling ordering
//!
//! With ordering enabled, the children of one parent (and the set of roots)
//! carry order values exactly `1..N`. Moves insert at a tentative value, shift
//! the rest of the group with [`OrderAllocator::bump_from`] and then close any
//! gaps with [`OrderAllocator::renumber_group`].

use crate::db::TreeStore;
use crate::models::{Filter, Materialized, TreeQuery};
use crate::operations::path_query::PathQueryBuilder;
use anyhow::Result;

/// Order arithmetic for one store
pub struct OrderAllocator<'a, S: TreeStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TreeStore + ?Sized> OrderAllocator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Order value that appends to the group (`1` for an empty group)
    pub async fn next_order(&self, parent_key: Option<&str>) -> Result<i64> {
        let max = self
            .store
            .max_order(&PathQueryBuilder::group_filter(parent_key))
            .await?;
        Ok(max.map_or(1, |max| max + 1))
    }

    /// Reassign `1..N` in current order, writing only the values that changed
    ///
    /// Returns the number of writes; running it on a dense group returns 0.
    pub async fn renumber_group(&self, parent_key: Option<&str>) -> Result<usize> {
        let siblings = TreeQuery::new(PathQueryBuilder::group_filter(parent_key))
            .get(self.store)
            .await?;

        let mut writes = 0;
        for (expected, sibling) in (1_i64..).zip(siblings.iter()) {
            if sibling.order() != Some(expected) {
                self.store.set_order(sibling.key(), expected).await?;
                writes += 1;
            }
        }

        if writes > 0 {
            tracing::debug!(
                "Renumbered {} of {} siblings under {:?}",
                writes,
                siblings.len(),
                parent_key
            );
        }
        Ok(writes)
    }

    /// Shift every sibling at or above `threshold` up by one, except `excluding`
    pub async fn bump_from(
        &self,
        parent_key: Option<&str>,
        threshold: i64,
        excluding: &str,
    ) -> Result<u64> {
        let filter = PathQueryBuilder::group_filter(parent_key)
            .and(Filter::OrderAtLeast(threshold))
            .and(Filter::KeyNe(excluding.to_string()));

        self.store.increment_order(&filter).await
    }
}
