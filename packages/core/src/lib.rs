//! TreePath Core - Materialized-Path Trees
//!
//! This crate maintains a self-referencing hierarchy inside a relational store.
//! Every node stores the chain of its ancestor keys (its materialized path), its
//! depth, and optionally a dense rank among its siblings, so ancestor,
//! descendant and sibling lookups are indexed prefix and range queries.
//!
//! # Architecture
//!
//! - **Capability trait**: any record implementing [`models::Materialized`] can be
//!   driven by the engine
//! - **Store abstraction**: the engine talks only to [`db::TreeStore`]
//! - **libsql**: [`db::SqliteStore`] is the relational implementation
//! - **Typestate ordering**: sibling ordering is a type parameter of
//!   [`services::TreeService`]
//!
//! # Modules
//!
//! - [`config`] - table and column configuration
//! - [`models`] - node model and query description
//! - [`db`] - store trait, SQLite and in-memory stores, move events
//! - [`operations`] - path derivation, ordering, moves, rebuilds, hierarchy assembly
//! - [`services`] - `TreeService`, the host-facing API

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::TreeConfig;
pub use db::{MemoryStore, MovedEvent, SqliteStore, TreeStore};
pub use models::*;
pub use operations::HierarchyNode;
pub use services::*;
