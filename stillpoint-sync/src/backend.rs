//! The remote backend seam.
//!
//! The hosted data service is opaque to the sync layer: request/response
//! reads and upserts plus a push-style change channel. Field-level conflict
//! semantics stay on the server; locally we only compare the version
//! markers it returns.

use crate::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stillpoint_types::{MetricEvent, OwnerId, RecordKind, RecordPayload};
use tokio::sync::mpsc;

/// A record as the hosted backend exchanges it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    pub kind: RecordKind,
    pub owner_id: OwnerId,
    pub payload: RecordPayload,
    /// Opaque version marker assigned by the backend.
    pub version: i64,
}

/// A change notification delivered on a subscription channel.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteChange {
    pub owner_id: OwnerId,
    pub kind: RecordKind,
    pub id: String,
    pub version: i64,
}

/// Request/response surface of the hosted backend.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Fetches all of an owner's rows in one collection.
    async fn select(&self, kind: RecordKind, owner: &OwnerId) -> SyncResult<Vec<RemoteRecord>>;

    /// Upserts one record and returns the server-confirmed version marker.
    async fn upsert(&self, record: &RemoteRecord) -> SyncResult<i64>;

    /// Deletes one record server-side.
    async fn delete(&self, kind: RecordKind, id: &str, owner: &OwnerId) -> SyncResult<()>;

    /// Ships a batch of queued analytics events.
    async fn push_metrics(&self, owner: &OwnerId, events: &[MetricEvent]) -> SyncResult<()>;

    /// Opens a change-notification channel scoped to one owner and the
    /// given collections. Dropping the receiver ends the subscription.
    async fn subscribe(
        &self,
        owner: &OwnerId,
        kinds: &[RecordKind],
    ) -> SyncResult<mpsc::Receiver<RemoteChange>>;
}
