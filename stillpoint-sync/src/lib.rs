//! Offline sync store for Stillpoint.
//!
//! Maintains a local mirror of the app's backend collections so features
//! read and write instantly regardless of connectivity, and reconciles
//! divergence with the hosted backend opportunistically.
//!
//! # Architecture
//!
//! - [`OfflineStore`] — the local mirror: `put`/`get`/`list` are pure
//!   local operations; `sync()` runs the three-step reconciliation pass
//!   (push pending → resolve conflicts last-write-wins → pull remote).
//! - [`RemoteBackend`] — the seam to the hosted data service; version
//!   markers are opaque. [`HttpBackend`] is the production implementation.
//! - [`AutoSyncRunner`] — event loop turning debounced write triggers,
//!   connectivity transitions, and remote change notifications into
//!   background sync passes.
//!
//! Everything is instance-owned and dependency-injected — no process-wide
//! singletons — so tests construct stores against in-memory databases and
//! mock backends.

mod backend;
mod debounce;
mod engine;
mod error;
mod http;
mod runner;
mod status;
mod store;

pub use backend::{RemoteBackend, RemoteChange, RemoteRecord};
pub use debounce::DebouncedTrigger;
pub use error::{SyncError, SyncResult};
pub use http::{HttpBackend, HttpConfig};
pub use runner::{AutoSyncRunner, RunnerCommand, RunnerHandle, create_offline_store};
pub use status::{CleanupReport, SubscriptionId, SyncIssue, SyncReport, SyncStatus};
pub use store::{OfflineStore, PutOptions};

pub use stillpoint_storage::{LocalDatabase, RecordQuery, SortKey, SortOrder};
pub use stillpoint_types as types;

use std::time::Duration;
use stillpoint_types::RecordKind;

/// Configuration for the offline sync store.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Delay between a sync-eligible write and the background sync it
    /// schedules. Writes inside the window coalesce into one pass.
    pub debounce_delay: Duration,

    /// Collections pulled during step 3 of a sync pass.
    pub pull_kinds: Vec<RecordKind>,

    /// Initial state of the automatic-trigger gate.
    pub auto_sync: bool,

    /// Max queued analytics events flushed per pass.
    pub metrics_batch_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_secs(5),
            pull_kinds: RecordKind::ALL.to_vec(),
            auto_sync: true,
            metrics_batch_limit: 256,
        }
    }
}
