//! Storage error types.

use thiserror::Error;

/// Result type for local-store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the local persistent store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Decode(String),
}

impl From<stillpoint_types::ParseKindError> for StorageError {
    fn from(e: stillpoint_types::ParseKindError) -> Self {
        StorageError::Decode(e.to_string())
    }
}
