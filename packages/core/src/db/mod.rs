//! Database Layer
//!
//! This module holds everything that touches persistence:
//!
//! - [`TreeStore`] - the storage abstraction the engine is written against
//! - [`SqliteStore`] - libsql implementation with schema bootstrap
//! - [`MemoryStore`] - in-process implementation with snapshot transactions
//! - [`MovedEvent`] - the record produced by every completed move

mod error;
pub mod events;
mod memory_store;
mod node_store;
pub mod sql;
mod sqlite_store;

pub use error::DatabaseError;
pub use events::MovedEvent;
pub use memory_store::MemoryStore;
pub use node_store::TreeStore;
pub use sqlite_store::SqliteStore;
