//! Service Layer Error Types
//!
//! This module defines the error type shared by the tree operations and
//! `TreeService`.

use crate::models::ValidationError;
use thiserror::Error;

/// Tree operation errors
///
/// Store failures are carried untranslated in [`TreeError::Store`]; every other
/// variant is raised by the engine itself before anything is written.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The move would place a node inside its own subtree
    #[error("Cannot move node {node_key} relative to {target_key}: target is the node itself or one of its descendants")]
    MoveNotPossible {
        node_key: String,
        target_key: String,
    },

    /// Node, target or parent reference does not resolve
    #[error("Node not found: {key}")]
    NotFound { key: String },

    /// Node data failed validation
    #[error("Node validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Storage operation failed
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl TreeError {
    /// Create a move not possible error
    pub fn move_not_possible(node_key: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self::MoveNotPossible {
            node_key: node_key.into(),
            target_key: target_key.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// True for guard failures, which leave the tree untouched
    pub fn is_move_not_possible(&self) -> bool {
        matches!(self, Self::MoveNotPossible { .. })
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
