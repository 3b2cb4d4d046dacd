//! Queued analytics events — the `offline_analytics` collection.
//!
//! Events are appended while the app runs (online or not) and drained in
//! batches when a sync pass flushes them to the backend. A failed flush
//! re-queues the batch.

use crate::error::StorageResult;
use crate::{from_millis, to_millis};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::sync::{Arc, Mutex};
use stillpoint_types::{MetricEvent, OwnerId};

/// Store for the offline analytics queue, backed by the shared connection.
#[derive(Clone)]
pub struct MetricsStore {
    conn: Arc<Mutex<Connection>>,
}

impl MetricsStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Appends one event to the queue.
    pub fn enqueue(&self, event: &MetricEvent) -> StorageResult<()> {
        let properties_json = serde_json::to_string(&event.properties)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO offline_analytics (owner_id, name, properties_json, recorded_at)
             VALUES (?, ?, ?, ?)",
            params![
                event.owner_id.as_str(),
                event.name,
                properties_json,
                to_millis(&event.recorded_at),
            ],
        )?;
        Ok(())
    }

    /// Removes and returns up to `limit` of an owner's oldest queued events.
    ///
    /// Select and delete run in one transaction so a crash can lose at most
    /// the in-flight batch, never duplicate it.
    pub fn take_batch(&self, owner: &OwnerId, limit: usize) -> StorageResult<Vec<MetricEvent>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let rows: Vec<(i64, String, String, i64)> = {
            let mut stmt = tx.prepare(
                "SELECT id, name, properties_json, recorded_at FROM offline_analytics
                 WHERE owner_id = ? ORDER BY recorded_at ASC, id ASC LIMIT ?",
            )?;
            stmt.query_map(params![owner.as_str(), limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<_, _>>()?
        };

        if rows.is_empty() {
            tx.commit()?;
            return Ok(Vec::new());
        }

        let id_list = rows
            .iter()
            .map(|(id, ..)| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        tx.execute(
            &format!("DELETE FROM offline_analytics WHERE id IN ({id_list})"),
            [],
        )?;
        tx.commit()?;
        drop(conn);

        rows.into_iter()
            .map(|(_, name, properties_json, recorded_at)| {
                Ok(MetricEvent {
                    owner_id: owner.clone(),
                    name,
                    properties: serde_json::from_str(&properties_json)?,
                    recorded_at: from_millis(recorded_at),
                })
            })
            .collect()
    }

    /// Puts a failed batch back on the queue.
    pub fn requeue(&self, events: &[MetricEvent]) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for event in events {
            let properties_json = serde_json::to_string(&event.properties)?;
            tx.execute(
                "INSERT INTO offline_analytics (owner_id, name, properties_json, recorded_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    event.owner_id.as_str(),
                    event.name,
                    properties_json,
                    to_millis(&event.recorded_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Age-based eviction: drops events recorded before `cutoff`.
    pub fn evict_before(&self, cutoff: &DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM offline_analytics WHERE recorded_at < ?",
            params![to_millis(cutoff)],
        )?;
        Ok(affected)
    }

    /// Removes every queued event belonging to an owner.
    pub fn purge_owner(&self, owner: &OwnerId) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM offline_analytics WHERE owner_id = ?",
            params![owner.as_str()],
        )?;
        Ok(affected)
    }

    /// Number of queued events for an owner.
    pub fn pending_count(&self, owner: &OwnerId) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM offline_analytics WHERE owner_id = ?",
            params![owner.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
