//! Error types for the store.

use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::CollectionName;

/// Store error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] gitdoc_engine::Error),

    #[error("write to '{collection}' still conflicted after {attempts} attempts")]
    Conflict {
        collection: CollectionName,
        attempts: u32,
    },

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("write queue is closed")]
    QueueClosed,
}

impl StoreError {
    /// Whether this is a terminal optimistic-concurrency failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Whether the document was rejected before reaching the remote.
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Remote(RemoteError::NotFound(_)))
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
