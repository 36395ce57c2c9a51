//! Error types for identifier allocation.

use std::path::PathBuf;

use mdr_store::StoreError;
use mdr_types::{Namespace, TypeError};
use thiserror::Error;

/// Errors that can occur while allocating identifiers.
#[derive(Debug, Error)]
pub enum CounterError {
    /// A counter file has an unexpected length or value. Never repaired
    /// automatically.
    #[error("corrupt counter file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The namespace has no numbers left.
    #[error("identifier numbers exhausted for {0}")]
    Exhausted(Namespace),

    /// Allocation distance is unusable.
    #[error("invalid allocation distance: {0}")]
    InvalidDistance(String),

    /// A counter was asked to move backwards.
    #[error("counter for {namespace} cannot move from {current} back to {requested}")]
    Regression {
        namespace: Namespace,
        current: u32,
        requested: u32,
    },

    /// The store passed to the allocator serves a different namespace.
    #[error("store serves {actual}, allocation requested for {expected}")]
    NamespaceMismatch {
        expected: Namespace,
        actual: Namespace,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),

    /// I/O error on the counter storage.
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Convenience type alias for counter operations.
pub type CounterResult<T> = std::result::Result<T, CounterError>;
