use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid namespace {value:?}: {reason}")]
    InvalidNamespace { value: String, reason: String },

    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("identifier numbers start at 1, got {0}")]
    InvalidNumber(u32),

    #[error("unknown revision code {0:?}")]
    UnknownRevisionCode(char),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
