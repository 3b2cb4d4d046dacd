//! Typed payloads, one variant per record kind.

use crate::record::RecordKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain data carried by a record.
///
/// Internally tagged so the stored JSON stays self-describing; the tag
/// values match [`RecordKind`]'s wire tags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RecordPayload {
    Session(SessionPayload),
    Progress(ProgressPayload),
    Preference(PreferencePayload),
    JournalEntry(JournalEntryPayload),
    CachedAudio(AudioManifest),
    Achievement(AchievementPayload),
}

impl RecordPayload {
    /// The kind this payload belongs to.
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::Session(_) => RecordKind::Session,
            RecordPayload::Progress(_) => RecordKind::Progress,
            RecordPayload::Preference(_) => RecordKind::Preference,
            RecordPayload::JournalEntry(_) => RecordKind::JournalEntry,
            RecordPayload::CachedAudio(_) => RecordKind::CachedAudio,
            RecordPayload::Achievement(_) => RecordKind::Achievement,
        }
    }
}

/// A completed guided or unguided meditation session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub technique: String,
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_before: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_after: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Rolled-up practice statistics for one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub total_sessions: u32,
    pub total_minutes: u64,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub updated_at: DateTime<Utc>,
}

/// App preferences mirrored for offline startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreferencePayload {
    pub theme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>,
    #[serde(default)]
    pub haptics_enabled: bool,
    #[serde(default)]
    pub background_sounds: bool,
}

/// A journal entry written after (or outside) a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_score: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub written_at: DateTime<Utc>,
}

/// Manifest describing a downloadable guided-audio asset.
///
/// The audio bytes themselves live in the content cache; this record only
/// tracks what exists and where to fetch it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioManifest {
    pub title: String,
    pub url: String,
    pub duration_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrator: Option<String>,
}

/// An unlocked (or in-progress) achievement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AchievementPayload {
    pub achievement_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    pub progress_percent: u8,
}
