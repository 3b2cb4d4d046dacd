//! Auto-sync runner — the event loop behind automatic reconciliation.
//!
//! Reacts to debounced write triggers, connectivity transitions, remote
//! change notifications, and explicit commands. The store itself stays a
//! passive handle; everything that *initiates* a background sync funnels
//! through this loop.

use crate::backend::{RemoteBackend, RemoteChange};
use crate::debounce::DebouncedTrigger;
use crate::error::{SyncError, SyncResult};
use crate::store::{OfflineStore, StoreInner, Subscribers, LAST_SYNC_KEY};
use crate::SyncConfig;
use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use stillpoint_storage::LocalDatabase;
use stillpoint_types::OwnerId;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Commands accepted by the runner.
#[derive(Debug)]
pub enum RunnerCommand {
    /// Run a sync for `owner` now, regardless of the auto-sync gate.
    SyncNow { owner: OwnerId },
    /// Stop the runner.
    Stop,
}

/// Handle for sending commands to a running [`AutoSyncRunner`].
#[derive(Clone)]
pub struct RunnerHandle {
    command_tx: mpsc::Sender<RunnerCommand>,
}

impl RunnerHandle {
    /// Requests an immediate sync (a manual "sync now" action).
    pub async fn sync_now(&self, owner: OwnerId) -> SyncResult<()> {
        self.command_tx
            .send(RunnerCommand::SyncNow { owner })
            .await
            .map_err(|_| SyncError::RunnerStopped)
    }

    /// Stops the runner's event loop.
    pub async fn stop(&self) -> SyncResult<()> {
        self.command_tx
            .send(RunnerCommand::Stop)
            .await
            .map_err(|_| SyncError::RunnerStopped)
    }
}

/// Creates an offline store, its runner, and the runner's command handle.
///
/// The runner must be driven (`runner.run().await`, typically inside
/// `tokio::spawn`) for automatic syncing to happen; a store used without
/// its runner still serves local reads/writes and manual `sync()` calls.
pub fn create_offline_store(
    db: LocalDatabase,
    backend: Arc<dyn RemoteBackend>,
    config: SyncConfig,
) -> SyncResult<(OfflineStore, RunnerHandle, AutoSyncRunner)> {
    let (debounce, fire_rx) = DebouncedTrigger::new(config.debounce_delay);
    let (online_tx, online_rx) = watch::channel(true);
    let (command_tx, command_rx) = mpsc::channel(16);

    let records = db.records();
    let last_sync = records
        .get_meta(LAST_SYNC_KEY)?
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let auto_sync = config.auto_sync;
    let store = OfflineStore {
        inner: Arc::new(StoreInner {
            records,
            content: db.content(),
            metrics: db.metrics(),
            backend,
            config,
            sync_in_flight: AtomicBool::new(false),
            auto_sync: AtomicBool::new(auto_sync),
            online_tx,
            last_sync: Mutex::new(last_sync),
            active_owner: Mutex::new(None),
            debounce,
            subscribers: Mutex::new(Subscribers::default()),
        }),
    };

    let handle = RunnerHandle { command_tx };
    let runner = AutoSyncRunner {
        store: store.clone(),
        fire_rx,
        online_rx,
        command_rx,
        changes_rx: None,
    };
    Ok((store, handle, runner))
}

/// The auto-sync event loop.
pub struct AutoSyncRunner {
    store: OfflineStore,
    fire_rx: mpsc::Receiver<OwnerId>,
    online_rx: watch::Receiver<bool>,
    command_rx: mpsc::Receiver<RunnerCommand>,
    changes_rx: Option<mpsc::Receiver<RemoteChange>>,
}

impl AutoSyncRunner {
    /// Feeds a backend change-notification channel into the loop; each
    /// notification schedules a debounced sync for its owner.
    pub fn watch_remote(&mut self, rx: mpsc::Receiver<RemoteChange>) {
        self.changes_rx = Some(rx);
    }

    /// Runs the event loop until stopped.
    pub async fn run(mut self) {
        info!("auto-sync runner started");
        loop {
            tokio::select! {
                Some(owner) = self.fire_rx.recv() => {
                    self.try_sync(owner, false).await;
                }
                changed = self.online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *self.online_rx.borrow_and_update();
                    if online {
                        if let Some(owner) = self.store.active_owner() {
                            debug!("back online, attempting sync for {owner}");
                            self.try_sync(owner, false).await;
                        }
                    }
                }
                change = recv_change(&mut self.changes_rx) => {
                    match change {
                        Some(change) => {
                            debug!("remote change for {}/{}", change.kind, change.id);
                            self.store.schedule_sync(change.owner_id);
                        }
                        None => {
                            debug!("remote change channel closed");
                            self.changes_rx = None;
                        }
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(RunnerCommand::SyncNow { owner }) => {
                            self.try_sync(owner, true).await;
                        }
                        Some(RunnerCommand::Stop) | None => {
                            info!("auto-sync runner stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn try_sync(&self, owner: OwnerId, manual: bool) {
        if !manual && !self.store.auto_sync_enabled() {
            return;
        }
        match self.store.sync(&owner).await {
            Ok(report) if !report.success => {
                warn!(
                    "background sync for {owner} finished with {} issues",
                    report.issues.len()
                );
            }
            Ok(_) => {}
            Err(SyncError::SyncInProgress) => {
                debug!("sync already running, skipping background trigger");
            }
            Err(SyncError::Offline) => {
                debug!("offline, skipping background sync for {owner}");
            }
            Err(e) => warn!("background sync for {owner} failed: {e}"),
        }
    }
}

/// Awaits the optional change channel, parking forever when absent so the
/// select arm simply never fires.
async fn recv_change(rx: &mut Option<mpsc::Receiver<RemoteChange>>) -> Option<RemoteChange> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
