use mdr_counter::CounterError;
use mdr_registry::RegistryError;
use mdr_store::StoreError;
use mdr_types::{Identifier, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MdrError {
    #[error("metadata object not found: {0}")]
    NotFound(Identifier),

    #[error("metadata object already exists: {0}")]
    AlreadyExists(Identifier),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("allocation error: {0}")]
    Counter(CounterError),

    #[error("registry error: {0}")]
    Registry(RegistryError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl MdrError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MdrError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, MdrError::AlreadyExists(_))
    }
}

impl From<StoreError> for MdrError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => MdrError::NotFound(id),
            StoreError::AlreadyExists(id) => MdrError::AlreadyExists(id),
            StoreError::Type(e) => MdrError::Type(e),
            other => MdrError::Store(other),
        }
    }
}

impl From<CounterError> for MdrError {
    fn from(e: CounterError) -> Self {
        match e {
            CounterError::Store(e) => e.into(),
            CounterError::Type(e) => MdrError::Type(e),
            other => MdrError::Counter(other),
        }
    }
}

impl From<RegistryError> for MdrError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Store(e) => e.into(),
            RegistryError::Type(e) => MdrError::Type(e),
            other => MdrError::Registry(other),
        }
    }
}

/// Failure reported by a [`MetadataEventSink`](crate::MetadataEventSink).
#[derive(Debug, Error)]
#[error("event sink failed: {0}")]
pub struct SinkError(pub String);

pub type MdrResult<T> = Result<T, MdrError>;
