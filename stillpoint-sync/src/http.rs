//! HTTP client for the hosted Stillpoint data API.
//!
//! Plain JSON over request/response endpoints, keyed by an API token.
//! The subscription channel is implemented as a polling task that diffs
//! version markers, since the transport offers no native push here.

use crate::backend::{RemoteBackend, RemoteChange, RemoteRecord};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use stillpoint_types::{MetricEvent, OwnerId, RecordKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Configuration for the hosted backend client.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Base URL for the API (e.g., "https://api.stillpoint.app").
    pub api_base_url: String,

    /// Per-app API token, sent as `x-api-key` on every request.
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Poll interval backing the subscription channel (seconds).
    pub poll_interval_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stillpoint.app".to_string(),
            api_key: None,
            request_timeout_secs: 30,
            poll_interval_secs: 30,
        }
    }
}

/// HTTP implementation of [`RemoteBackend`].
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpConfig,
}

#[derive(Deserialize)]
struct UpsertResponse {
    version: i64,
}

impl HttpBackend {
    pub fn new(config: HttpConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn keyed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    fn collection_url(&self, kind: RecordKind) -> String {
        format!("{}/api/v1/{}", self.config.api_base_url, kind.collection())
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn select(&self, kind: RecordKind, owner: &OwnerId) -> SyncResult<Vec<RemoteRecord>> {
        let url = format!(
            "{}?owner={}",
            self.collection_url(kind),
            urlencoding::encode(owner.as_str())
        );
        let rows: Vec<RemoteRecord> = self
            .keyed(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows)
    }

    async fn upsert(&self, record: &RemoteRecord) -> SyncResult<i64> {
        let url = format!(
            "{}/{}",
            self.collection_url(record.kind),
            urlencoding::encode(&record.id)
        );
        let resp = self
            .keyed(self.client.put(&url))
            .json(record)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let resp: UpsertResponse = resp.json().await?;
        Ok(resp.version)
    }

    async fn delete(&self, kind: RecordKind, id: &str, owner: &OwnerId) -> SyncResult<()> {
        let url = format!(
            "{}/{}?owner={}",
            self.collection_url(kind),
            urlencoding::encode(id),
            urlencoding::encode(owner.as_str())
        );
        self.keyed(self.client.delete(&url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn push_metrics(&self, owner: &OwnerId, events: &[MetricEvent]) -> SyncResult<()> {
        let url = format!("{}/api/v1/metrics", self.config.api_base_url);
        let resp = self
            .keyed(self.client.post(&url))
            .json(&serde_json::json!({ "owner": owner, "events": events }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        kinds: &[RecordKind],
    ) -> SyncResult<mpsc::Receiver<RemoteChange>> {
        let (tx, rx) = mpsc::channel(64);
        let backend = self.clone();
        let owner = owner.clone();
        let kinds = kinds.to_vec();
        let poll = Duration::from_secs(self.config.poll_interval_secs);

        tokio::spawn(async move {
            let mut seen: HashMap<(RecordKind, String), i64> = HashMap::new();
            let mut interval = tokio::time::interval(poll);
            // The first tick primes `seen` without emitting anything; only
            // movement after that is a change.
            let mut priming = true;

            loop {
                interval.tick().await;
                for kind in &kinds {
                    let rows = match backend.select(*kind, &owner).await {
                        Ok(rows) => rows,
                        Err(e) => {
                            debug!("change poll for {kind} failed: {e}");
                            continue;
                        }
                    };
                    for row in rows {
                        let key = (row.kind, row.id.clone());
                        let moved = seen.get(&key) != Some(&row.version);
                        seen.insert(key, row.version);
                        if moved && !priming {
                            let change = RemoteChange {
                                owner_id: row.owner_id,
                                kind: row.kind,
                                id: row.id,
                                version: row.version,
                            };
                            if tx.send(change).await.is_err() {
                                debug!("change subscriber dropped, ending poll loop");
                                return;
                            }
                        }
                    }
                }
                if priming {
                    priming = false;
                }
            }
        });

        Ok(rx)
    }
}

/// Maps a non-success HTTP response into a readable backend error,
/// preserving the response body instead of reqwest's terse status error.
async fn status_error(resp: reqwest::Response) -> SyncError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    warn!("backend returned {status}: {body}");
    SyncError::Backend(format!("{status}: {body}"))
}
