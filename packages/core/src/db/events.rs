//! Move Events
//!
//! Every completed move produces exactly one `MovedEvent`. The service returns it
//! to the caller and also broadcasts it to subscribers, so the host can relay it
//! to whatever notification mechanism it owns without the engine depending on
//! one.
//!
//! # Event Flow
//!
//! 1. `TreeService` commits the move transaction
//! 2. The refreshed node and its previous parent are packed into a `MovedEvent`
//! 3. The event is sent on the service's broadcast channel (dropped if nobody listens)
//! 4. The same event is returned from the move call

use crate::models::Materialized;
use serde::{Deserialize, Serialize};

/// Record of a completed move
///
/// `previous_parent` is the node's parent immediately before the move, `None`
/// when it was a root. Order-only moves report the unchanged parent here; use
/// [`MovedEvent::parent_changed`] to tell them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedEvent<T> {
    /// The moved node as stored after the move
    pub model: T,

    pub previous_parent: Option<T>,
}

impl<T: Materialized> MovedEvent<T> {
    pub fn new(model: T, previous_parent: Option<T>) -> Self {
        Self {
            model,
            previous_parent,
        }
    }

    /// Event type identifier for logging and relays
    pub fn event_type(&self) -> &'static str {
        "node:moved"
    }

    /// Key of the parent before the move
    pub fn previous_parent_key(&self) -> Option<&str> {
        self.previous_parent.as_ref().map(|parent| parent.key())
    }

    /// False for order-only moves within the same sibling group
    pub fn parent_changed(&self) -> bool {
        self.previous_parent_key() != self.model.parent_key()
    }
}
