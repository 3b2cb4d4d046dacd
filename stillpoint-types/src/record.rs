//! Record envelope and sync bookkeeping types.

use crate::payload::RecordPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of the user a record belongs to.
///
/// Used to partition the local mirror for multi-tenant isolation; never
/// interpreted beyond equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The domain collections the local mirror tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    Session,
    Progress,
    Preference,
    JournalEntry,
    CachedAudio,
    Achievement,
}

impl RecordKind {
    /// Every kind, in a stable order. Used as the default pull set.
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Session,
        RecordKind::Progress,
        RecordKind::Preference,
        RecordKind::JournalEntry,
        RecordKind::CachedAudio,
        RecordKind::Achievement,
    ];

    /// Wire tag, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Session => "session",
            RecordKind::Progress => "progress",
            RecordKind::Preference => "preference",
            RecordKind::JournalEntry => "journal-entry",
            RecordKind::CachedAudio => "cached-audio",
            RecordKind::Achievement => "achievement",
        }
    }

    /// Remote collection name on the hosted backend.
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Session => "sessions",
            RecordKind::Progress => "progress",
            RecordKind::Preference => "preferences",
            RecordKind::JournalEntry => "journal_entries",
            RecordKind::CachedAudio => "cached_audio",
            RecordKind::Achievement => "achievements",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a kind or state tag from storage.
#[derive(Debug, thiserror::Error)]
#[error("unknown tag: {0}")]
pub struct ParseKindError(pub String);

impl FromStr for RecordKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(RecordKind::Session),
            "progress" => Ok(RecordKind::Progress),
            "preference" => Ok(RecordKind::Preference),
            "journal-entry" => Ok(RecordKind::JournalEntry),
            "cached-audio" => Ok(RecordKind::CachedAudio),
            "achievement" => Ok(RecordKind::Achievement),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// Where a record stands relative to the remote backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local write not yet pushed.
    Pending,
    /// Local and remote agree; `remote_version` is the agreed marker.
    Synced,
    /// A local write and a divergent remote version were both observed.
    Conflict,
    /// Last push attempt failed; retried on every subsequent pass.
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
            SyncState::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "conflict" => Ok(SyncState::Conflict),
            "error" => Ok(SyncState::Error),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// One cached, sync-tracked unit of domain data in the local mirror.
///
/// A record's `id` is stable for its lifetime; updates mutate the row in
/// place. The sync layer is the sole authority for `sync_state` transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: RecordKind,
    pub payload: RecordPayload,
    pub owner_id: OwnerId,
    pub last_modified_local: DateTime<Utc>,
    /// Version marker from the backend at the last known agreement.
    /// Absent when the record has never synced.
    pub remote_version: Option<i64>,
    /// True when the local payload differs from the last-synced remote one.
    pub has_local_changes: bool,
    pub sync_state: SyncState,
}

/// Metadata for one cached blob (audio, imagery) kept for offline playback.
///
/// Independent lifecycle from records: downloaded once, read many times,
/// never synced back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub id: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub downloaded_at: DateTime<Utc>,
    pub access_count: u64,
}

/// One analytics event queued while offline and flushed opportunistically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub owner_id: OwnerId,
    pub name: String,
    pub properties: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
