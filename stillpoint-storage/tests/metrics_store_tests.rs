use chrono::{Duration, TimeZone, Utc};
use stillpoint_storage::LocalDatabase;
use stillpoint_types::{MetricEvent, OwnerId};

fn event(owner: &str, name: &str, minute: u32) -> MetricEvent {
    MetricEvent {
        owner_id: OwnerId::new(owner),
        name: name.to_string(),
        properties: serde_json::json!({ "source": "test" }),
        recorded_at: Utc.with_ymd_and_hms(2026, 8, 1, 9, minute, 0).unwrap(),
    }
}

#[test]
fn take_batch_drains_oldest_first() {
    let db = LocalDatabase::open_in_memory().unwrap();
    let store = db.metrics();
    let owner = OwnerId::new("u1");
    store.enqueue(&event("u1", "session_completed", 5)).unwrap();
    store.enqueue(&event("u1", "app_opened", 1)).unwrap();
    store.enqueue(&event("u2", "app_opened", 0)).unwrap();

    let batch = store.take_batch(&owner, 10).unwrap();
    assert_eq!(
        batch.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        ["app_opened", "session_completed"]
    );

    // Drained for this owner; the other owner's queue is untouched.
    assert_eq!(store.pending_count(&owner).unwrap(), 0);
    assert_eq!(store.pending_count(&OwnerId::new("u2")).unwrap(), 1);
}

#[test]
fn take_batch_respects_limit() {
    let db = LocalDatabase::open_in_memory().unwrap();
    let store = db.metrics();
    let owner = OwnerId::new("u1");
    for minute in 0..5 {
        store.enqueue(&event("u1", "tick", minute)).unwrap();
    }

    let batch = store.take_batch(&owner, 2).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(store.pending_count(&owner).unwrap(), 3);
}

#[test]
fn requeue_restores_a_failed_batch() {
    let db = LocalDatabase::open_in_memory().unwrap();
    let store = db.metrics();
    let owner = OwnerId::new("u1");
    store.enqueue(&event("u1", "session_completed", 0)).unwrap();

    let batch = store.take_batch(&owner, 10).unwrap();
    assert_eq!(store.pending_count(&owner).unwrap(), 0);

    store.requeue(&batch).unwrap();
    let restored = store.take_batch(&owner, 10).unwrap();
    assert_eq!(restored, batch);
}

#[test]
fn evicts_by_recorded_age() {
    let db = LocalDatabase::open_in_memory().unwrap();
    let store = db.metrics();
    store.enqueue(&event("u1", "ancient", 0)).unwrap();

    let cutoff = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap() + Duration::hours(1);
    assert_eq!(store.evict_before(&cutoff).unwrap(), 1);
    assert_eq!(store.pending_count(&OwnerId::new("u1")).unwrap(), 0);
}

#[test]
fn purge_owner_clears_queue() {
    let db = LocalDatabase::open_in_memory().unwrap();
    let store = db.metrics();
    store.enqueue(&event("u1", "a", 0)).unwrap();
    store.enqueue(&event("u1", "b", 1)).unwrap();
    store.enqueue(&event("u2", "c", 2)).unwrap();

    assert_eq!(store.purge_owner(&OwnerId::new("u1")).unwrap(), 2);
    assert_eq!(store.pending_count(&OwnerId::new("u2")).unwrap(), 1);
}
