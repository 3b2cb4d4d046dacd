//! Derived sync health, pass summaries, and observer types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stillpoint_types::RecordKind;

/// Process-wide sync health, recomputed on demand from the record store
/// and live flags. Only `last_sync_time` persists across restarts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Records awaiting their first successful push.
    pub pending_count: usize,
    pub sync_in_progress: bool,
    pub auto_sync_enabled: bool,
}

/// One failed item from a sync pass.
#[derive(Clone, Debug, Serialize)]
pub struct SyncIssue {
    /// Record id, or empty for a collection-level failure (e.g. a pull).
    pub id: String,
    pub kind: Option<RecordKind>,
    pub message: String,
}

/// Outcome summary of one reconciliation pass.
///
/// Partial failure is the expected common case, so the pass returns this
/// summary instead of erroring: `success` is true only when nothing is
/// left conflicted or errored.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncReport {
    /// Records pushed to the backend (including resolved conflicts).
    pub synced: usize,
    /// Remote rows applied to the local mirror.
    pub pulled: usize,
    /// Records still in conflict when the pass finished.
    pub conflicts: usize,
    /// Push/pull failures during the pass.
    pub errors: usize,
    pub issues: Vec<SyncIssue>,
    pub success: bool,
}

/// Counts removed by one cleanup run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub records_removed: usize,
    pub content_removed: usize,
    pub metrics_removed: usize,
}

/// Identifier of one registered observer, for unsubscribing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Observer of sync-status changes, invoked synchronously after the change.
pub type StatusListener = Box<dyn Fn(&SyncStatus) + Send + Sync>;

/// Observer of connectivity transitions.
pub type ConnectivityListener = Box<dyn Fn(bool) + Send + Sync>;
