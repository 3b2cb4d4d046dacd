//! Auto-sync runner behavior: debounced background syncs, reconnect
//! triggers, manual sync-now, remote change notifications.

mod common;

use common::{MockBackend, owner, remote_session, session_payload, test_store, wait_for};
use std::time::Duration;
use stillpoint_sync::types::{RecordKind, SyncState};
use stillpoint_sync::{PutOptions, RemoteChange};

fn is_synced(store: &stillpoint_sync::OfflineStore, id: &str) -> bool {
    store
        .get(id, None, None)
        .unwrap()
        .map(|r| r.sync_state == SyncState::Synced)
        .unwrap_or(false)
}

#[tokio::test(start_paused = true)]
async fn eligible_write_syncs_in_the_background() {
    let backend = MockBackend::new();
    let (store, handle, runner) = test_store(backend.clone());
    tokio::spawn(runner.run());
    let u1 = owner("u1");

    store
        .put("s1", RecordKind::Session, session_payload(10), &u1, &PutOptions::local_write())
        .unwrap();

    // The debounce window elapses and the runner pushes the record without
    // any manual sync() call.
    wait_for(|| is_synced(&store, "s1")).await;
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn coming_back_online_syncs_the_active_owner() {
    let backend = MockBackend::new();
    let (store, handle, runner) = test_store(backend.clone());
    tokio::spawn(runner.run());
    let u1 = owner("u1");

    store.set_online(false);
    store
        .put("s1", RecordKind::Session, session_payload(10), &u1, &PutOptions::local_write())
        .unwrap();

    // Offline writes schedule nothing.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!is_synced(&store, "s1"));

    store.set_online(true);
    wait_for(|| is_synced(&store, "s1")).await;
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disabled_auto_sync_blocks_triggers_but_not_sync_now() {
    let backend = MockBackend::new();
    let (store, handle, runner) = test_store(backend.clone());
    tokio::spawn(runner.run());
    let u1 = owner("u1");

    store.set_auto_sync_enabled(false);
    store
        .put("s1", RecordKind::Session, session_payload(10), &u1, &PutOptions::local_write())
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!is_synced(&store, "s1"));

    // The manual "sync now" action works regardless of the gate.
    handle.sync_now(u1.clone()).await.unwrap();
    wait_for(|| is_synced(&store, "s1")).await;
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn remote_change_notifications_schedule_a_pull() {
    let backend = MockBackend::new();
    backend.seed(remote_session("r1", "u1", 20, 2));
    let (store, handle, mut runner) = test_store(backend.clone());

    let changes = store.subscribe_remote(&owner("u1")).await.unwrap();
    runner.watch_remote(changes);
    tokio::spawn(runner.run());

    assert!(backend.emit_change(RemoteChange {
        owner_id: owner("u1"),
        kind: RecordKind::Session,
        id: "r1".to_string(),
        version: 2,
    }));

    wait_for(|| is_synced(&store, "r1")).await;
    let record = store.get("r1", None, None).unwrap().unwrap();
    assert_eq!(record.remote_version, Some(2));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_loop() {
    let backend = MockBackend::new();
    let (_store, handle, runner) = test_store(backend.clone());
    let task = tokio::spawn(runner.run());

    handle.stop().await.unwrap();
    task.await.unwrap();

    // Once stopped, commands are rejected.
    assert!(handle.sync_now(owner("u1")).await.is_err());
}
