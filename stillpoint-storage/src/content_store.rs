//! Cached blob content — downloaded audio and imagery kept for offline
//! playback. Write-once, read-many; never part of the sync protocol.

use crate::error::StorageResult;
use crate::{from_millis, to_millis};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Arc, Mutex};
use stillpoint_types::ContentEntry;

/// Store for cached binary assets, backed by the shared connection.
#[derive(Clone)]
pub struct ContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl ContentStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Stores (or replaces) a downloaded asset. A replacement counts as a
    /// fresh download: `downloaded_at` and `access_count` reset.
    pub fn put(&self, id: &str, content_type: &str, bytes: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO cached_content
             (id, content_type, bytes, size_bytes, downloaded_at, access_count)
             VALUES (?, ?, ?, ?, ?, 0)",
            params![
                id,
                content_type,
                bytes,
                bytes.len() as i64,
                to_millis(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Loads an asset and bumps its access count.
    pub fn get(&self, id: &str) -> StorageResult<Option<(ContentEntry, Vec<u8>)>> {
        let conn = self.conn.lock().unwrap();
        let touched = conn.execute(
            "UPDATE cached_content SET access_count = access_count + 1 WHERE id = ?",
            params![id],
        )?;
        if touched == 0 {
            return Ok(None);
        }
        let row = conn
            .query_row(
                "SELECT id, content_type, size_bytes, downloaded_at, access_count, bytes
                 FROM cached_content WHERE id = ?",
                params![id],
                |row| {
                    Ok((
                        entry_from_row(row)?,
                        row.get::<_, Vec<u8>>(5)?,
                    ))
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Reads an asset's metadata without touching the access count.
    pub fn entry(&self, id: &str) -> StorageResult<Option<ContentEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                "SELECT id, content_type, size_bytes, downloaded_at, access_count
                 FROM cached_content WHERE id = ?",
                params![id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Deletes one asset. Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM cached_content WHERE id = ?", params![id])?;
        Ok(affected > 0)
    }

    /// Age-based eviction: removes assets downloaded before `cutoff`.
    pub fn evict_before(&self, cutoff: &DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM cached_content WHERE downloaded_at < ?",
            params![to_millis(cutoff)],
        )?;
        Ok(affected)
    }

    /// Total bytes held in the cache.
    pub fn total_size_bytes(&self) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM cached_content",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    /// Number of cached assets.
    pub fn count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM cached_content", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentEntry> {
    Ok(ContentEntry {
        id: row.get(0)?,
        content_type: row.get(1)?,
        size_bytes: row.get::<_, i64>(2)? as u64,
        downloaded_at: from_millis(row.get(3)?),
        access_count: row.get::<_, i64>(4)? as u64,
    })
}
