//! Persistence and directory seams used by the push core.
//!
//! Implementations only need get/set/merge semantics per key; nothing here
//! relies on cross-document transactions.

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::dispatch::{DispatchHistoryEntry, DispatchJob};
use crate::domain::permission::{DeviceMarker, PermissionAskRecord};
use crate::domain::recipient::Recipient;
use crate::domain::token::{DeviceToken, TokenMerge};

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, recipient_id: Uuid) -> Result<Option<DeviceToken>>;

    /// Replace the record for `token.recipient_id` wholesale.
    async fn set(&self, token: &DeviceToken) -> Result<()>;

    /// Apply `merge` to an existing record and stamp `updated_at`. Returns the
    /// merged record, or `None` when there was nothing to merge into.
    async fn merge(
        &self,
        recipient_id: Uuid,
        merge: TokenMerge,
        updated_at: OffsetDateTime,
    ) -> Result<Option<DeviceToken>>;
}

#[async_trait]
pub trait AskStore: Send + Sync {
    async fn get(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
    ) -> Result<Option<PermissionAskRecord>>;

    /// Write-once. Returns `false` if a record already existed, in which case
    /// the stored record is left as is.
    async fn insert(&self, record: &PermissionAskRecord) -> Result<bool>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &DispatchJob) -> Result<()>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: &DispatchHistoryEntry) -> Result<()>;

    /// Entries created at or after `since`, newest first.
    async fn list_since(&self, since: OffsetDateTime) -> Result<Vec<DispatchHistoryEntry>>;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn list(&self) -> Result<Vec<Recipient>>;
}

/// Liveness probe for whatever backs the stores.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}
