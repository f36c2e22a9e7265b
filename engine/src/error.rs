//! Error types for the gitdoc engine.

use thiserror::Error;

/// All possible errors from the gitdoc engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
