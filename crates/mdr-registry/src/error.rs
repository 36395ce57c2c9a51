//! Error types for the store registry.

use mdr_store::StoreError;
use mdr_types::{Namespace, TypeError};
use thiserror::Error;

/// Errors that can occur while configuring or resolving stores.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Missing, unreadable or inconsistent configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Read-only resolution of a namespace that has no storage yet.
    #[error("namespace {0} is not provisioned")]
    NamespaceNotProvisioned(Namespace),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Convenience type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
