//! Data Models
//!
//! - `Materialized` - capability trait for records stored in a materialized-path tree
//! - `TreeNode` - the record type shipped with the crate
//! - `Filter` / `TreeQuery` - store-independent query description

mod node;
mod query;

pub use node::{validate_key, Materialized, NodeKey, TreeNode, ValidationError, PATH_SEPARATOR};
pub use query::{Direction, Filter, OrderBy, SortField, TreeQuery};
