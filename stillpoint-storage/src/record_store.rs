//! Sync-tracked record storage — the `offline_data` and `sync_metadata`
//! collections.
//!
//! Rows are keyed by `(kind, id)`; `owner_id` partitions them per user.
//! This store only persists what it is given: all `sync_state` transition
//! logic lives in the sync layer, which is the sole writer of these rows.

use crate::error::{StorageError, StorageResult};
use crate::{from_millis, to_millis};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::sync::{Arc, Mutex};
use stillpoint_types::{OwnerId, Record, RecordKind, SyncState};

/// Sort key for [`RecordStore::list`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    ModifiedAt,
    Id,
}

/// Sort direction for [`RecordStore::list`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filters and ordering for a record listing.
#[derive(Clone, Debug, Default)]
pub struct RecordQuery {
    pub state: Option<SyncState>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

/// Store for sync-tracked records, backed by the shared connection.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

const RECORD_COLUMNS: &str =
    "kind, id, owner_id, payload_json, sync_state, remote_version, has_local_changes, modified_at";

type RecordRow = (String, String, String, String, String, Option<i64>, bool, i64);

impl RecordStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Saves (upserts) a record, replacing any row with the same `(kind, id)`.
    pub fn upsert(&self, record: &Record) -> StorageResult<()> {
        let payload_json = serde_json::to_string(&record.payload)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO offline_data
             (kind, id, owner_id, payload_json, sync_state, remote_version, has_local_changes, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.kind.as_str(),
                record.id,
                record.owner_id.as_str(),
                payload_json,
                record.sync_state.as_str(),
                record.remote_version,
                record.has_local_changes,
                to_millis(&record.last_modified_local),
            ],
        )?;
        Ok(())
    }

    /// Fetches a record by id.
    ///
    /// `kind` and `owner` act as filters: when supplied, a row that exists
    /// under a different kind or owner is reported as a miss rather than
    /// returned, guarding against cross-kind and cross-tenant id collisions.
    pub fn get(
        &self,
        id: &str,
        kind: Option<RecordKind>,
        owner: Option<&OwnerId>,
    ) -> StorageResult<Option<Record>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM offline_data WHERE id = ?");
        let mut bind: Vec<&str> = vec![id];
        if let Some(k) = kind {
            sql.push_str(" AND kind = ?");
            bind.push(k.as_str());
        }
        if let Some(o) = owner {
            sql.push_str(" AND owner_id = ?");
            bind.push(o.as_str());
        }
        sql.push_str(" LIMIT 1");

        let conn = self.conn.lock().unwrap();
        let row: Option<RecordRow> = conn
            .query_row(&sql, params_from_iter(bind), record_row)
            .optional()?;
        drop(conn);

        row.map(decode_record).transpose()
    }

    /// Lists an owner's records of one kind, filtered/sorted/capped per the
    /// query. The result is fully materialized.
    pub fn list(
        &self,
        kind: RecordKind,
        owner: &OwnerId,
        query: &RecordQuery,
    ) -> StorageResult<Vec<Record>> {
        let mut sql =
            format!("SELECT {RECORD_COLUMNS} FROM offline_data WHERE kind = ? AND owner_id = ?");
        let mut bind: Vec<&str> = vec![kind.as_str(), owner.as_str()];
        if let Some(state) = query.state {
            sql.push_str(" AND sync_state = ?");
            bind.push(state.as_str());
        }
        let column = match query.sort {
            SortKey::ModifiedAt => "modified_at",
            SortKey::Id => "id",
        };
        let direction = match query.order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {column} {direction}"));
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.query_records(&sql, bind)
    }

    /// Returns an owner's records whose sync state is in `states`, oldest
    /// local modification first. Used by the sync pass to gather its work.
    pub fn records_in_states(
        &self,
        owner: &OwnerId,
        states: &[SyncState],
    ) -> StorageResult<Vec<Record>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; states.len()].join(",");
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM offline_data
             WHERE owner_id = ? AND sync_state IN ({placeholders})
             ORDER BY modified_at ASC"
        );
        let mut bind: Vec<&str> = vec![owner.as_str()];
        bind.extend(states.iter().map(|s| s.as_str()));

        self.query_records(&sql, bind)
    }

    /// Counts records in one sync state across the whole store.
    pub fn count_state(&self, state: SyncState) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM offline_data WHERE sync_state = ?",
            params![state.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Counts an owner's records in one sync state.
    pub fn count_in_state(&self, owner: &OwnerId, state: SyncState) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM offline_data WHERE owner_id = ? AND sync_state = ?",
            params![owner.as_str(), state.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Deletes one record. Returns whether a row was removed.
    pub fn delete(&self, kind: RecordKind, id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM offline_data WHERE kind = ? AND id = ?",
            params![kind.as_str(), id],
        )?;
        Ok(affected > 0)
    }

    /// Age-based eviction: removes records last modified before `cutoff`
    /// that carry no local changes. Unsynced data is never evicted.
    pub fn evict_synced_before(&self, cutoff: &DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM offline_data
             WHERE modified_at < ? AND has_local_changes = 0 AND sync_state = ?",
            params![to_millis(cutoff), SyncState::Synced.as_str()],
        )?;
        Ok(affected)
    }

    /// Removes every record belonging to an owner (account deletion).
    pub fn purge_owner(&self, owner: &OwnerId) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM offline_data WHERE owner_id = ?",
            params![owner.as_str()],
        )?;
        Ok(affected)
    }

    // ── Sync metadata ────────────────────────────────────────────

    /// Upserts one bookkeeping value (e.g. the last sync time).
    pub fn set_meta(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, to_millis(&Utc::now())],
        )?;
        Ok(())
    }

    /// Reads one bookkeeping value.
    pub fn get_meta(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM sync_metadata WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn query_records(&self, sql: &str, bind: Vec<&str>) -> StorageResult<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows: Vec<RecordRow> = stmt
            .query_map(params_from_iter(bind), record_row)?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(decode_record).collect()
    }
}

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_record(row: RecordRow) -> StorageResult<Record> {
    let (kind, id, owner_id, payload_json, sync_state, remote_version, has_local_changes, modified_at) =
        row;
    let kind: RecordKind = kind.parse()?;
    let payload = serde_json::from_str(&payload_json)?;
    let sync_state: SyncState = sync_state.parse()?;

    // The payload tag is authoritative for its own shape; a mismatch with
    // the kind column means the row was written outside the sync layer.
    let record = Record {
        id,
        kind,
        payload,
        owner_id: OwnerId::new(owner_id),
        last_modified_local: from_millis(modified_at),
        remote_version,
        has_local_changes,
        sync_state,
    };
    if record.payload.kind() != record.kind {
        return Err(StorageError::Decode(format!(
            "payload tagged {} stored under kind {}",
            record.payload.kind(),
            record.kind
        )));
    }
    Ok(record)
}
