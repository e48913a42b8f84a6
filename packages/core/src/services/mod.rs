//! Business Services
//!
//! - `TreeService` - relationship reads, moves, lifecycle hooks and repair
//! - `TreeError` - error type shared by the services and the tree operations

pub mod error;
pub mod tree_service;

pub use error::{TreeError, TreeResult};
pub use tree_service::{Ordered, OrderingMode, TreeService, Unordered};
