//! HTTP backend against a mock server, plus error classification.

mod common;

use common::owner;
use stillpoint_sync::types::RecordKind;
use stillpoint_sync::{HttpBackend, HttpConfig, RemoteBackend, SyncError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> HttpBackend {
    HttpBackend::new(HttpConfig {
        api_base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        request_timeout_secs: 5,
        poll_interval_secs: 1,
    })
    .unwrap()
}

#[tokio::test]
async fn select_fetches_owner_scoped_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions"))
        .and(query_param("owner", "u1"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "s1",
                "kind": "session",
                "owner_id": "u1",
                "payload": {
                    "type": "session",
                    "technique": "body-scan",
                    "duration_minutes": 10,
                    "completed_at": "2026-08-01T07:30:00Z"
                },
                "version": 3
            }
        ])))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let rows = backend.select(RecordKind::Session, &owner("u1")).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "s1");
    assert_eq!(rows[0].version, 3);
    assert_eq!(rows[0].kind, RecordKind::Session);
}

#[tokio::test]
async fn upsert_returns_the_server_version() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/sessions/s1"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": 7
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let record = common::remote_session("s1", "u1", 10, 0);
    assert_eq!(backend.upsert(&record).await.unwrap(), 7);
}

#[tokio::test]
async fn upsert_surfaces_the_error_body_on_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/sessions/s1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let record = common::remote_session("s1", "u1", 10, 0);
    let err = backend.upsert(&record).await.unwrap_err();
    match err {
        SyncError::Backend(message) => assert!(message.contains("quota exceeded")),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn delete_hits_the_owner_scoped_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/journal_entries/j1"))
        .and(query_param("owner", "u1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    backend.delete(RecordKind::JournalEntry, "j1", &owner("u1")).await.unwrap();
}

#[tokio::test]
async fn connection_refused_classifies_as_offline() {
    // Nothing listens on this port.
    let backend = HttpBackend::new(HttpConfig {
        api_base_url: "http://127.0.0.1:1".to_string(),
        api_key: None,
        request_timeout_secs: 2,
        poll_interval_secs: 1,
    })
    .unwrap();

    let err = backend.select(RecordKind::Session, &owner("u1")).await.unwrap_err();
    assert!(matches!(err, SyncError::Offline));
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn push_metrics_posts_a_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/metrics"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let events = vec![stillpoint_sync::types::MetricEvent {
        owner_id: owner("u1"),
        name: "session_completed".to_string(),
        properties: serde_json::json!({ "minutes": 10 }),
        recorded_at: chrono::Utc::now(),
    }];
    backend.push_metrics(&owner("u1"), &events).await.unwrap();
}
