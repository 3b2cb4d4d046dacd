//! The reconciliation pass.
//!
//! Three strictly sequential steps: push pending local writes, force-push
//! conflicted records (last-write-wins, local side wins), then pull the
//! configured collections and merge. Sequencing guarantees a pull can
//! never clobber a push still in flight.
//!
//! Conflict detection is optimistic versioning over the backend's opaque
//! markers and cannot see every conflict shape: two devices editing the
//! same record while both offline collapse into one last-write-wins
//! outcome with no notice, and resolution always keeps the local side,
//! discarding concurrent remote edits. Per-field causality tracking
//! (vector clocks, CRDT merge) would detect what a single marker cannot;
//! this layer only compares whatever marker the backend returns.

use crate::backend::RemoteRecord;
use crate::error::{SyncError, SyncResult};
use crate::status::{SyncIssue, SyncReport};
use crate::store::{OfflineStore, PutOptions, PutOutcome, LAST_SYNC_KEY};
use chrono::Utc;
use std::sync::atomic::Ordering;
use stillpoint_types::{OwnerId, Record, SyncState};
use tracing::{debug, info, warn};

impl OfflineStore {
    /// Runs one reconciliation pass for an owner.
    ///
    /// Fails fast when offline or when a pass is already running — a
    /// second caller is never queued. Per-record backend failures do not
    /// abort the pass; they are aggregated into the returned report. Total
    /// unreachability aborts the remainder early instead of timing out
    /// once per record.
    ///
    /// There is no cancellation of a pass in flight; callers can only
    /// prevent future automatic passes via
    /// [`OfflineStore::set_auto_sync_enabled`].
    pub async fn sync(&self, owner: &OwnerId) -> SyncResult<SyncReport> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        if self
            .inner
            .sync_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::SyncInProgress);
        }

        *self.inner.active_owner.lock().unwrap() = Some(owner.clone());
        self.notify_status();

        let result = self.run_pass(owner).await;

        // Completion bookkeeping runs on success and failure alike so a
        // failed pass can never wedge the in-flight flag.
        let finished_at = Utc::now();
        *self.inner.last_sync.lock().unwrap() = Some(finished_at);
        if let Err(e) = self
            .inner
            .records
            .set_meta(LAST_SYNC_KEY, &finished_at.to_rfc3339())
        {
            warn!("failed to persist last sync time: {e}");
        }
        self.inner.sync_in_flight.store(false, Ordering::SeqCst);
        self.notify_status();

        match &result {
            Ok(report) => info!(
                "sync pass for {owner} finished: {} pushed, {} pulled, {} conflicted, {} errors",
                report.synced, report.pulled, report.conflicts, report.errors
            ),
            Err(e) => warn!("sync pass for {owner} failed: {e}"),
        }
        result
    }

    async fn run_pass(&self, owner: &OwnerId) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();

        // Step 1: push pending local writes. Records that errored on a
        // previous pass retry on the same scan — error is never terminal.
        let work = self
            .inner
            .records
            .records_in_states(owner, &[SyncState::Pending, SyncState::Error])?;
        debug!("pushing {} pending records for {owner}", work.len());
        for mut record in work {
            match self.inner.backend.upsert(&to_remote(&record)).await {
                Ok(version) => {
                    self.mark_synced(&mut record, version)?;
                    report.synced += 1;
                }
                Err(e) => {
                    let unreachable = e.is_connectivity();
                    record.sync_state = SyncState::Error;
                    self.inner.records.upsert(&record)?;
                    report.errors += 1;
                    report.issues.push(SyncIssue {
                        id: record.id.clone(),
                        kind: Some(record.kind),
                        message: e.to_string(),
                    });
                    if unreachable {
                        warn!("backend unreachable, aborting sync pass early");
                        return self.finish_report(owner, report);
                    }
                }
            }
        }

        // Step 2: resolve conflicts — last-write-wins. The local payload is
        // force-pushed with a fresh server version; the remote value is
        // discarded. A failed push leaves the record conflicted.
        let conflicted = self
            .inner
            .records
            .records_in_states(owner, &[SyncState::Conflict])?;
        for mut record in conflicted {
            match self.inner.backend.upsert(&to_remote(&record)).await {
                Ok(version) => {
                    self.mark_synced(&mut record, version)?;
                    report.synced += 1;
                }
                Err(e) => {
                    let unreachable = e.is_connectivity();
                    report.issues.push(SyncIssue {
                        id: record.id.clone(),
                        kind: Some(record.kind),
                        message: format!("conflict resolution failed: {e}"),
                    });
                    if unreachable {
                        warn!("backend unreachable, aborting sync pass early");
                        return self.finish_report(owner, report);
                    }
                }
            }
        }

        // Step 3: pull the configured collections and merge. Clean local
        // records take newer remote rows seamlessly; locally-dirty records
        // are left for the next pass's steps 1–2.
        for kind in &self.inner.config.pull_kinds {
            match self.inner.backend.select(*kind, owner).await {
                Ok(rows) => {
                    for row in rows {
                        if row.owner_id != *owner || row.kind != *kind {
                            debug!("skipping mis-scoped pull row {}/{}", row.kind, row.id);
                            continue;
                        }
                        let outcome = self.apply_put(
                            &row.id,
                            row.kind,
                            row.payload,
                            owner,
                            &PutOptions::remote_download(row.version),
                        )?;
                        if matches!(outcome, PutOutcome::Created | PutOutcome::Updated) {
                            report.pulled += 1;
                        }
                    }
                }
                Err(e) => {
                    let unreachable = e.is_connectivity();
                    report.errors += 1;
                    report.issues.push(SyncIssue {
                        id: String::new(),
                        kind: Some(*kind),
                        message: format!("pull failed: {e}"),
                    });
                    if unreachable {
                        warn!("backend unreachable, aborting sync pass early");
                        return self.finish_report(owner, report);
                    }
                }
            }
        }

        // Step 4: flush queued analytics, best-effort. Never affects the
        // report counts; a failed batch goes back on the queue.
        let events = self
            .inner
            .metrics
            .take_batch(owner, self.inner.config.metrics_batch_limit)?;
        if !events.is_empty() {
            match self.inner.backend.push_metrics(owner, &events).await {
                Ok(()) => debug!("flushed {} analytics events", events.len()),
                Err(e) => {
                    warn!("failed to flush {} analytics events, re-queueing: {e}", events.len());
                    self.inner.metrics.requeue(&events)?;
                }
            }
        }

        self.finish_report(owner, report)
    }

    fn mark_synced(&self, record: &mut Record, version: i64) -> SyncResult<()> {
        record.sync_state = SyncState::Synced;
        record.has_local_changes = false;
        record.remote_version = Some(version);
        self.inner.records.upsert(record)?;
        Ok(())
    }

    /// Still-conflicted is counted from the store at pass end so records
    /// newly flagged during the pull are included.
    fn finish_report(&self, owner: &OwnerId, mut report: SyncReport) -> SyncResult<SyncReport> {
        report.conflicts = self.inner.records.count_in_state(owner, SyncState::Conflict)?;
        report.success = report.conflicts == 0 && report.errors == 0;
        Ok(report)
    }
}

fn to_remote(record: &Record) -> RemoteRecord {
    RemoteRecord {
        id: record.id.clone(),
        kind: record.kind,
        owner_id: record.owner_id.clone(),
        payload: record.payload.clone(),
        version: record.remote_version.unwrap_or(0),
    }
}
