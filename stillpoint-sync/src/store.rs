//! The offline store — a local mirror the app reads and writes instantly,
//! regardless of connectivity.
//!
//! `put`/`get`/`list` never touch the network; reconciliation with the
//! backend happens opportunistically in [`OfflineStore::sync`]
//! (see the `engine` module). This type is the sole authority for
//! `sync_state` transitions: nothing else writes the record collections.

use crate::backend::{RemoteBackend, RemoteChange};
use crate::debounce::DebouncedTrigger;
use crate::error::{SyncError, SyncResult};
use crate::status::{
    CleanupReport, ConnectivityListener, StatusListener, SubscriptionId, SyncStatus,
};
use crate::SyncConfig;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use stillpoint_storage::{ContentStore, MetricsStore, RecordQuery, RecordStore};
use stillpoint_types::{
    ContentEntry, MetricEvent, OwnerId, Record, RecordKind, RecordPayload, SyncState,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

pub(crate) const LAST_SYNC_KEY: &str = "last_sync_time";

/// Options for [`OfflineStore::put`].
#[derive(Clone, Debug)]
pub struct PutOptions {
    /// Whether this write is eligible for the next sync pass. Defaults to
    /// true; remote downloads pass false.
    pub mark_for_sync: bool,
    /// Bypass conflict detection and replace the local payload outright.
    pub overwrite_local: bool,
    /// The backend version this payload corresponds to, when known.
    pub remote_version: Option<i64>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            mark_for_sync: true,
            overwrite_local: false,
            remote_version: None,
        }
    }
}

impl PutOptions {
    /// An ordinary local write: sync-eligible, conflict-checked.
    pub fn local_write() -> Self {
        Self::default()
    }

    /// A row downloaded from the backend at `version`: not sync-eligible,
    /// merged through conflict detection.
    pub fn remote_download(version: i64) -> Self {
        Self {
            mark_for_sync: false,
            overwrite_local: false,
            remote_version: Some(version),
        }
    }

    /// A cache write that replaces the local payload unconditionally.
    pub fn overwrite() -> Self {
        Self {
            mark_for_sync: false,
            overwrite_local: true,
            remote_version: None,
        }
    }
}

/// How an `apply_put` landed. Drives pull accounting and notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PutOutcome {
    Created,
    Updated,
    Conflicted,
    Unchanged,
}

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    status: Vec<(u64, StatusListener)>,
    connectivity: Vec<(u64, ConnectivityListener)>,
}

pub(crate) struct StoreInner {
    pub(crate) records: RecordStore,
    pub(crate) content: ContentStore,
    pub(crate) metrics: MetricsStore,
    pub(crate) backend: Arc<dyn RemoteBackend>,
    pub(crate) config: SyncConfig,
    /// Single in-flight sync pass at a time; second callers fail fast.
    pub(crate) sync_in_flight: AtomicBool,
    pub(crate) auto_sync: AtomicBool,
    pub(crate) online_tx: watch::Sender<bool>,
    pub(crate) last_sync: Mutex<Option<DateTime<Utc>>>,
    /// Most recent owner written or synced; the target for automatic
    /// triggers that carry no owner of their own.
    pub(crate) active_owner: Mutex<Option<OwnerId>>,
    pub(crate) debounce: DebouncedTrigger,
    pub(crate) subscribers: Mutex<Subscribers>,
}

/// Handle to the offline store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct OfflineStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl OfflineStore {
    /// Stores or updates a record in the local mirror.
    ///
    /// Conflict detection is optimistic versioning and nothing more: a
    /// write carrying a `remote_version` that differs from the record's
    /// last-known one marks the record `conflict` instead of overwriting
    /// blind. A sync-eligible write schedules the debounced background
    /// sync when online.
    pub fn put(
        &self,
        id: &str,
        kind: RecordKind,
        payload: RecordPayload,
        owner: &OwnerId,
        options: &PutOptions,
    ) -> SyncResult<()> {
        if id.is_empty() {
            return Err(SyncError::EmptyRecordId);
        }
        if payload.kind() != kind {
            return Err(SyncError::KindMismatch {
                expected: kind,
                actual: payload.kind(),
            });
        }

        let outcome = self.apply_put(id, kind, payload, owner, options)?;
        *self.inner.active_owner.lock().unwrap() = Some(owner.clone());

        if outcome == PutOutcome::Unchanged {
            return Ok(());
        }
        if options.mark_for_sync {
            self.schedule_sync(owner.clone());
        }
        self.notify_status();
        Ok(())
    }

    /// Returns a record, or none. Pure local read.
    ///
    /// `kind` and `owner` act as filters: a record that exists under a
    /// different kind or owner is a miss, guarding against cross-kind and
    /// cross-tenant id collisions.
    pub fn get(
        &self,
        id: &str,
        kind: Option<RecordKind>,
        owner: Option<&OwnerId>,
    ) -> SyncResult<Option<Record>> {
        Ok(self.inner.records.get(id, kind, owner)?)
    }

    /// Lists an owner's records of one kind. Materialized, never lazy;
    /// fine at the cache's expected scale.
    pub fn list(
        &self,
        kind: RecordKind,
        owner: &OwnerId,
        query: &RecordQuery,
    ) -> SyncResult<Vec<Record>> {
        Ok(self.inner.records.list(kind, owner, query)?)
    }

    /// Periodic housekeeping: evicts synced records, cached content and
    /// queued analytics older than the threshold. Records still carrying
    /// local changes are never evicted. Not part of the sync protocol.
    pub fn cleanup(&self, max_age_days: u32) -> SyncResult<CleanupReport> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(max_age_days));
        let report = CleanupReport {
            records_removed: self.inner.records.evict_synced_before(&cutoff)?,
            content_removed: self.inner.content.evict_before(&cutoff)?,
            metrics_removed: self.inner.metrics.evict_before(&cutoff)?,
        };
        debug!(
            "cleanup removed {} records, {} blobs, {} queued events",
            report.records_removed, report.content_removed, report.metrics_removed
        );
        Ok(report)
    }

    /// Account-deletion path: removes everything the owner has locally.
    /// Nothing is pushed to the backend — deletes do not propagate.
    pub fn purge_owner(&self, owner: &OwnerId) -> SyncResult<usize> {
        let records = self.inner.records.purge_owner(owner)?;
        let metrics = self.inner.metrics.purge_owner(owner)?;
        debug!("purged {records} records and {metrics} queued events for {owner}");
        self.notify_status();
        Ok(records)
    }

    // ── Content cache ────────────────────────────────────────────

    /// Caches a downloaded asset for offline playback.
    pub fn store_content(&self, id: &str, content_type: &str, bytes: &[u8]) -> SyncResult<()> {
        Ok(self.inner.content.put(id, content_type, bytes)?)
    }

    /// Loads a cached asset, bumping its access count.
    pub fn load_content(&self, id: &str) -> SyncResult<Option<(ContentEntry, Vec<u8>)>> {
        Ok(self.inner.content.get(id)?)
    }

    /// Reads a cached asset's metadata without counting an access.
    pub fn content_entry(&self, id: &str) -> SyncResult<Option<ContentEntry>> {
        Ok(self.inner.content.entry(id)?)
    }

    // ── Analytics queue ──────────────────────────────────────────

    /// Queues an analytics event for the next flush.
    pub fn record_metric(
        &self,
        owner: &OwnerId,
        name: &str,
        properties: serde_json::Value,
    ) -> SyncResult<()> {
        let event = MetricEvent {
            owner_id: owner.clone(),
            name: name.to_string(),
            properties,
            recorded_at: Utc::now(),
        };
        Ok(self.inner.metrics.enqueue(&event)?)
    }

    // ── Status & subscriptions ───────────────────────────────────

    /// Recomputes the current sync status.
    pub fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            is_online: self.is_online(),
            last_sync_time: *self.inner.last_sync.lock().unwrap(),
            pending_count: self.inner.records.count_state(SyncState::Pending)?,
            sync_in_progress: self.inner.sync_in_flight.load(Ordering::SeqCst),
            auto_sync_enabled: self.auto_sync_enabled(),
        })
    }

    /// Registers a sync-status observer. Observers run synchronously after
    /// each change and must not subscribe or unsubscribe from inside the
    /// callback. No buffering, no replay for late subscribers.
    pub fn subscribe_status(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut subs = self.inner.subscribers.lock().unwrap();
        subs.next_id += 1;
        let id = subs.next_id;
        subs.status.push((id, Box::new(listener)));
        SubscriptionId(id)
    }

    /// Registers a connectivity observer (same constraints as above).
    pub fn subscribe_connectivity(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut subs = self.inner.subscribers.lock().unwrap();
        subs.next_id += 1;
        let id = subs.next_id;
        subs.connectivity.push((id, Box::new(listener)));
        SubscriptionId(id)
    }

    /// Removes one observer.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.inner.subscribers.lock().unwrap();
        subs.status.retain(|(sid, _)| *sid != id.0);
        subs.connectivity.retain(|(sid, _)| *sid != id.0);
    }

    // ── Connectivity & auto-sync ─────────────────────────────────

    /// Records a connectivity transition from the runtime's signal.
    ///
    /// The transition to online wakes the auto-sync runner, which attempts
    /// a sync for the active owner when auto-sync is enabled.
    pub fn set_online(&self, online: bool) {
        let previous = self.inner.online_tx.send_replace(online);
        if previous == online {
            return;
        }
        debug!("connectivity changed: online={online}");
        {
            let subs = self.inner.subscribers.lock().unwrap();
            for (_, listener) in &subs.connectivity {
                listener(online);
            }
        }
        self.notify_status();
    }

    pub fn is_online(&self) -> bool {
        *self.inner.online_tx.borrow()
    }

    /// Gates every automatic trigger (debounce, reconnect, remote change).
    /// Manual [`OfflineStore::sync`] calls are always allowed.
    pub fn set_auto_sync_enabled(&self, enabled: bool) {
        self.inner.auto_sync.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.inner.debounce.cancel();
        }
        self.notify_status();
    }

    pub fn auto_sync_enabled(&self) -> bool {
        self.inner.auto_sync.load(Ordering::SeqCst)
    }

    /// Most recent owner written or synced, if any.
    pub fn active_owner(&self) -> Option<OwnerId> {
        self.inner.active_owner.lock().unwrap().clone()
    }

    /// Opens the backend's change-notification channel for an owner,
    /// scoped to the configured pull kinds. Feed the receiver to
    /// [`crate::AutoSyncRunner::watch_remote`] to turn notifications into
    /// background passes.
    pub async fn subscribe_remote(
        &self,
        owner: &OwnerId,
    ) -> SyncResult<mpsc::Receiver<RemoteChange>> {
        self.inner
            .backend
            .subscribe(owner, &self.inner.config.pull_kinds)
            .await
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Schedules a debounced background sync when automatic triggers are
    /// currently allowed.
    pub(crate) fn schedule_sync(&self, owner: OwnerId) {
        if self.is_online() && self.auto_sync_enabled() {
            self.inner.debounce.schedule(owner);
        }
    }

    pub(crate) fn notify_status(&self) {
        let status = match self.status() {
            Ok(status) => status,
            Err(e) => {
                warn!("failed to compute sync status: {e}");
                return;
            }
        };
        let subs = self.inner.subscribers.lock().unwrap();
        for (_, listener) in &subs.status {
            listener(&status);
        }
    }

    /// Core write path shared by `put` and the pull merge. Returns how the
    /// write landed; persistence errors propagate to the caller.
    pub(crate) fn apply_put(
        &self,
        id: &str,
        kind: RecordKind,
        payload: RecordPayload,
        owner: &OwnerId,
        options: &PutOptions,
    ) -> SyncResult<PutOutcome> {
        let now = Utc::now();
        let existing = match self.inner.records.get(id, Some(kind), None)? {
            Some(record) if record.owner_id != *owner => {
                // Cross-tenant id collision: ids are unique per collection,
                // so the write proceeds as a fresh create and replaces the
                // stale row.
                warn!("record {kind}/{id} re-created for a different owner");
                None
            }
            other => other,
        };

        let Some(mut record) = existing else {
            let (sync_state, has_local_changes) = if options.mark_for_sync {
                (SyncState::Pending, true)
            } else if options.remote_version.is_some() {
                (SyncState::Synced, false)
            } else {
                (SyncState::Pending, false)
            };
            let record = Record {
                id: id.to_string(),
                kind,
                payload,
                owner_id: owner.clone(),
                last_modified_local: now,
                remote_version: options.remote_version,
                has_local_changes,
                sync_state,
            };
            self.inner.records.upsert(&record)?;
            return Ok(PutOutcome::Created);
        };

        if options.overwrite_local {
            record.payload = payload;
            record.last_modified_local = now;
            record.remote_version = options.remote_version.or(record.remote_version);
            if options.mark_for_sync {
                record.sync_state = SyncState::Pending;
                record.has_local_changes = true;
            } else {
                record.has_local_changes = false;
                record.sync_state = if record.remote_version.is_some() {
                    SyncState::Synced
                } else {
                    SyncState::Pending
                };
            }
            self.inner.records.upsert(&record)?;
            return Ok(PutOutcome::Updated);
        }

        match options.remote_version {
            // Version matches what we already hold: either a plain local
            // edit, or a remote row that brings nothing new.
            Some(v) if record.remote_version == Some(v) => {
                if options.mark_for_sync {
                    self.apply_local_edit(&mut record, payload, now)?;
                    Ok(PutOutcome::Updated)
                } else {
                    Ok(PutOutcome::Unchanged)
                }
            }
            // Version differs from the last-known one: divergence.
            Some(v) => {
                if options.mark_for_sync {
                    // A local write claiming a version we don't hold. Keep
                    // the new local payload; the next pass force-pushes it.
                    record.payload = payload;
                    record.last_modified_local = now;
                    record.has_local_changes = true;
                    record.sync_state = SyncState::Conflict;
                    self.inner.records.upsert(&record)?;
                    Ok(PutOutcome::Conflicted)
                } else if record.has_local_changes {
                    // Pull merge over a locally-dirty record: flag it and
                    // leave the payload for the push/resolve steps to own.
                    if record.sync_state == SyncState::Conflict {
                        return Ok(PutOutcome::Unchanged);
                    }
                    record.sync_state = SyncState::Conflict;
                    self.inner.records.upsert(&record)?;
                    Ok(PutOutcome::Conflicted)
                } else {
                    // Untouched locally: the newer remote write lands
                    // seamlessly.
                    record.payload = payload;
                    record.last_modified_local = now;
                    record.remote_version = Some(v);
                    record.has_local_changes = false;
                    record.sync_state = SyncState::Synced;
                    self.inner.records.upsert(&record)?;
                    Ok(PutOutcome::Updated)
                }
            }
            None => {
                if options.mark_for_sync {
                    self.apply_local_edit(&mut record, payload, now)?;
                } else {
                    // Cache refresh: payload only, sync bookkeeping intact.
                    record.payload = payload;
                    record.last_modified_local = now;
                    self.inner.records.upsert(&record)?;
                }
                Ok(PutOutcome::Updated)
            }
        }
    }

    /// A plain local edit: the record becomes pending again, except a
    /// conflicted record, which stays conflicted (still divergent).
    fn apply_local_edit(
        &self,
        record: &mut Record,
        payload: RecordPayload,
        now: DateTime<Utc>,
    ) -> SyncResult<()> {
        record.payload = payload;
        record.last_modified_local = now;
        record.has_local_changes = true;
        if record.sync_state != SyncState::Conflict {
            record.sync_state = SyncState::Pending;
        }
        self.inner.records.upsert(record)?;
        Ok(())
    }
}
