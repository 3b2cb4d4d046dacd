#![allow(dead_code)]

//! Shared test support: an in-memory stand-in for the hosted backend with
//! failure injection, plus payload and store builders.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stillpoint_sync::types::{MetricEvent, OwnerId, RecordKind, RecordPayload, SessionPayload};
use stillpoint_sync::{
    AutoSyncRunner, LocalDatabase, OfflineStore, RemoteBackend, RemoteChange, RemoteRecord,
    RunnerHandle, SyncConfig, SyncError, SyncResult, create_offline_store,
};
use tokio::sync::{Notify, mpsc};

#[derive(Default)]
struct MockState {
    rows: HashMap<(RecordKind, String), RemoteRecord>,
    next_version: i64,
    fail_ids: HashSet<String>,
    offline_ids: HashSet<String>,
    fail_metrics: bool,
    block_next_upsert: bool,
    upserts: usize,
    metric_batches: Vec<Vec<MetricEvent>>,
    change_tx: Option<mpsc::Sender<RemoteChange>>,
}

/// In-memory hosted backend with failure injection and a gate that can
/// hold one upsert open mid-pass.
pub struct MockBackend {
    state: Mutex<MockState>,
    /// Signaled when a gated upsert has started.
    pub entered: Notify,
    /// Releases a gated upsert.
    pub gate: Notify,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
            entered: Notify::new(),
            gate: Notify::new(),
        })
    }

    /// Seeds a row as if another device had uploaded it.
    pub fn seed(&self, record: RemoteRecord) {
        let mut state = self.state.lock().unwrap();
        state.next_version = state.next_version.max(record.version);
        state.rows.insert((record.kind, record.id.clone()), record);
    }

    /// Makes upserts of `id` fail with a backend error.
    pub fn fail_on(&self, id: &str) {
        self.state.lock().unwrap().fail_ids.insert(id.to_string());
    }

    /// Makes upserts of `id` fail as if the network dropped.
    pub fn offline_on(&self, id: &str) {
        self.state.lock().unwrap().offline_ids.insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_ids.clear();
        state.offline_ids.clear();
        state.fail_metrics = false;
    }

    pub fn fail_metrics(&self, fail: bool) {
        self.state.lock().unwrap().fail_metrics = fail;
    }

    /// The next upsert blocks until `gate` is notified, signaling `entered`
    /// when it starts.
    pub fn block_next_upsert(&self) {
        self.state.lock().unwrap().block_next_upsert = true;
    }

    pub fn row(&self, kind: RecordKind, id: &str) -> Option<RemoteRecord> {
        self.state.lock().unwrap().rows.get(&(kind, id.to_string())).cloned()
    }

    pub fn upsert_count(&self) -> usize {
        self.state.lock().unwrap().upserts
    }

    pub fn metric_batches(&self) -> Vec<Vec<MetricEvent>> {
        self.state.lock().unwrap().metric_batches.clone()
    }

    /// Emits a change on the channel handed out by `subscribe`, if any.
    pub fn emit_change(&self, change: RemoteChange) -> bool {
        let state = self.state.lock().unwrap();
        state
            .change_tx
            .as_ref()
            .map(|tx| tx.try_send(change).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn select(&self, kind: RecordKind, owner: &OwnerId) -> SyncResult<Vec<RemoteRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .values()
            .filter(|r| r.kind == kind && r.owner_id == *owner)
            .cloned()
            .collect())
    }

    async fn upsert(&self, record: &RemoteRecord) -> SyncResult<i64> {
        let gated = {
            let mut state = self.state.lock().unwrap();
            let gated = state.block_next_upsert;
            state.block_next_upsert = false;
            gated
        };
        if gated {
            self.entered.notify_one();
            self.gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        state.upserts += 1;
        if state.fail_ids.contains(&record.id) {
            return Err(SyncError::Backend("injected failure".to_string()));
        }
        if state.offline_ids.contains(&record.id) {
            return Err(SyncError::Offline);
        }
        state.next_version += 1;
        let version = state.next_version;
        let mut stored = record.clone();
        stored.version = version;
        state.rows.insert((record.kind, record.id.clone()), stored);
        Ok(version)
    }

    async fn delete(&self, kind: RecordKind, id: &str, _owner: &OwnerId) -> SyncResult<()> {
        self.state.lock().unwrap().rows.remove(&(kind, id.to_string()));
        Ok(())
    }

    async fn push_metrics(&self, _owner: &OwnerId, events: &[MetricEvent]) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_metrics {
            return Err(SyncError::Backend("metrics endpoint down".to_string()));
        }
        state.metric_batches.push(events.to_vec());
        Ok(())
    }

    async fn subscribe(
        &self,
        _owner: &OwnerId,
        _kinds: &[RecordKind],
    ) -> SyncResult<mpsc::Receiver<RemoteChange>> {
        let (tx, rx) = mpsc::channel(16);
        self.state.lock().unwrap().change_tx = Some(tx);
        Ok(rx)
    }
}

// ── Builders ─────────────────────────────────────────────────────

pub fn owner(id: &str) -> OwnerId {
    OwnerId::new(id)
}

pub fn session_payload(minutes: u32) -> RecordPayload {
    RecordPayload::Session(SessionPayload {
        technique: "breath-focus".into(),
        duration_minutes: minutes,
        completed_at: Utc.with_ymd_and_hms(2026, 8, 1, 7, 30, 0).unwrap(),
        mood_before: None,
        mood_after: None,
        notes: None,
    })
}

pub fn remote_session(id: &str, owner_id: &str, minutes: u32, version: i64) -> RemoteRecord {
    RemoteRecord {
        id: id.to_string(),
        kind: RecordKind::Session,
        owner_id: OwnerId::new(owner_id),
        payload: session_payload(minutes),
        version,
    }
}

/// A store over an in-memory database with a short debounce window.
pub fn test_store(backend: Arc<MockBackend>) -> (OfflineStore, RunnerHandle, AutoSyncRunner) {
    let db = LocalDatabase::open_in_memory().unwrap();
    let config = SyncConfig {
        debounce_delay: Duration::from_millis(200),
        ..Default::default()
    };
    create_offline_store(db, backend, config).unwrap()
}

/// Polls until `condition` holds; panics after ~2s of (paused) clock.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
