//! Sync error types.

use stillpoint_storage::StorageError;
use stillpoint_types::RecordKind;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the offline sync layer.
///
/// Per-record failures inside a sync pass are not surfaced here — they are
/// aggregated into the pass's [`crate::SyncReport`], since partial success
/// is the expected common case.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync pass is already in progress")]
    SyncInProgress,

    #[error("network unreachable")]
    Offline,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("record id must not be empty")]
    EmptyRecordId,

    #[error("payload kind {actual} does not match {expected}")]
    KindMismatch {
        expected: RecordKind,
        actual: RecordKind,
    },

    #[error("auto-sync runner is not running")]
    RunnerStopped,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        // Connection-level failures mean the backend as a whole is
        // unreachable; status-level failures stay per-record.
        if e.is_connect() || e.is_timeout() {
            SyncError::Offline
        } else {
            SyncError::Http(e)
        }
    }
}

impl SyncError {
    /// True when the failure indicates total unreachability, in which case
    /// a sync pass aborts early rather than timing out once per record.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Offline)
    }
}
