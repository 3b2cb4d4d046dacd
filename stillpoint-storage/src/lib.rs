//! SQLite storage layer for Stillpoint.
//!
//! One database file holds the four local collections the offline layer
//! owns: `offline_data` (sync-tracked records), `cached_content` (blob
//! assets for offline playback), `sync_metadata` (key/value bookkeeping)
//! and `offline_analytics` (queued metric events).
//!
//! # Architecture
//!
//! - Records are stored as typed JSON blobs; kind, owner, sync state and
//!   modification time are plaintext indexed columns so every `list()`
//!   filter runs as SQL.
//! - Schema upgrades are additive and applied automatically on open.
//! - All stores clone cheaply and share one connection behind a mutex.

mod content_store;
mod error;
mod metrics_store;
mod record_store;

pub use content_store::ContentStore;
pub use error::{StorageError, StorageResult};
pub use metrics_store::MetricsStore;
pub use record_store::{RecordQuery, RecordStore, SortKey, SortOrder};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Handle to one open Stillpoint database.
///
/// Hands out per-collection store handles that share the underlying
/// connection.
#[derive(Clone)]
pub struct LocalDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl LocalDatabase {
    /// Opens or creates the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Store handle for sync-tracked records and sync metadata.
    pub fn records(&self) -> RecordStore {
        RecordStore::new(self.conn.clone())
    }

    /// Store handle for cached blob content.
    pub fn content(&self) -> ContentStore {
        ContentStore::new(self.conn.clone())
    }

    /// Store handle for the queued analytics events.
    pub fn metrics(&self) -> MetricsStore {
        MetricsStore::new(self.conn.clone())
    }
}

pub(crate) fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

// -- Schema --

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS offline_data (
            kind              TEXT NOT NULL,
            id                TEXT NOT NULL,
            owner_id          TEXT NOT NULL,
            payload_json      TEXT NOT NULL,
            sync_state        TEXT NOT NULL,
            remote_version    INTEGER,
            has_local_changes INTEGER NOT NULL DEFAULT 0,
            modified_at       INTEGER NOT NULL,
            PRIMARY KEY (kind, id)
        );
        CREATE INDEX IF NOT EXISTS idx_offline_data_owner ON offline_data(owner_id);
        CREATE INDEX IF NOT EXISTS idx_offline_data_kind ON offline_data(kind);
        CREATE INDEX IF NOT EXISTS idx_offline_data_state ON offline_data(owner_id, sync_state);
        CREATE INDEX IF NOT EXISTS idx_offline_data_modified ON offline_data(modified_at);

        CREATE TABLE IF NOT EXISTS cached_content (
            id            TEXT PRIMARY KEY,
            content_type  TEXT NOT NULL DEFAULT 'application/octet-stream',
            bytes         BLOB NOT NULL,
            size_bytes    INTEGER NOT NULL,
            downloaded_at INTEGER NOT NULL,
            access_count  INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_cached_content_age ON cached_content(downloaded_at);

        CREATE TABLE IF NOT EXISTS sync_metadata (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS offline_analytics (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id        TEXT NOT NULL,
            name            TEXT NOT NULL,
            properties_json TEXT NOT NULL,
            recorded_at     INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_offline_analytics_owner
            ON offline_analytics(owner_id, recorded_at);
        "#,
    )?;

    // Migration: databases created before content types were tracked lack
    // the content_type column. CREATE TABLE IF NOT EXISTS won't add it.
    let has_content_type = conn
        .prepare("SELECT content_type FROM cached_content LIMIT 0")
        .is_ok();
    if !has_content_type {
        conn.execute_batch(
            "ALTER TABLE cached_content
             ADD COLUMN content_type TEXT NOT NULL DEFAULT 'application/octet-stream';",
        )?;
    }

    Ok(())
}
