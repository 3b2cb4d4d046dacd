//! Core types shared across the Stillpoint offline-sync stack.
//!
//! The sync layer treats record payloads as opaque, but consumers get a
//! typed surface: every cached record carries a [`RecordPayload`] variant
//! matching its [`RecordKind`], so feature code never round-trips through
//! untyped JSON.

mod payload;
mod record;

pub use payload::{
    AchievementPayload, AudioManifest, JournalEntryPayload, PreferencePayload, ProgressPayload,
    RecordPayload, SessionPayload,
};
pub use record::{ContentEntry, MetricEvent, OwnerId, ParseKindError, Record, RecordKind, SyncState};
