use std::path::PathBuf;

use mdr_types::{Identifier, Namespace, TypeError};

/// Errors from metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record (active or tombstoned) already exists for the identifier.
    #[error("metadata object already exists: {0}")]
    AlreadyExists(Identifier),

    /// No active record exists for the identifier.
    #[error("metadata object not found: {0}")]
    NotFound(Identifier),

    /// The identifier belongs to a namespace this store does not serve.
    #[error("store for {expected} cannot hold {actual}")]
    WrongNamespace {
        expected: Namespace,
        actual: Identifier,
    },

    /// Persisted data is malformed or inconsistent.
    #[error("corrupt store data at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store was configured with unusable parameters.
    #[error("invalid store configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    /// I/O error from the underlying storage.
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
