//! Process-local stores. Used by `STORE_MODE=memory` and by the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::dispatch::{DispatchHistoryEntry, DispatchJob};
use crate::domain::permission::{DeviceMarker, PermissionAskRecord};
use crate::domain::recipient::Recipient;
use crate::domain::token::{DeviceToken, TokenMerge};
use crate::infra::store::{
    AskStore, HistoryStore, JobQueue, RecipientDirectory, StoreHealth, TokenStore,
};

#[derive(Default)]
struct MemoryState {
    tokens: HashMap<Uuid, DeviceToken>,
    asks: HashMap<(Uuid, DeviceMarker), PermissionAskRecord>,
    jobs: Vec<DispatchJob>,
    history: Vec<DispatchHistoryEntry>,
    recipients: Vec<Recipient>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_recipient(&self, recipient: Recipient) {
        let mut state = self.state.write().await;
        state.recipients.retain(|r| r.id != recipient.id);
        state.recipients.push(recipient);
    }

    pub async fn jobs(&self) -> Vec<DispatchJob> {
        self.state.read().await.jobs.clone()
    }

    pub async fn history(&self) -> Vec<DispatchHistoryEntry> {
        self.state.read().await.history.clone()
    }

    pub async fn token_count(&self) -> usize {
        self.state.read().await.tokens.len()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, recipient_id: Uuid) -> Result<Option<DeviceToken>> {
        Ok(self.state.read().await.tokens.get(&recipient_id).cloned())
    }

    async fn set(&self, token: &DeviceToken) -> Result<()> {
        self.state
            .write()
            .await
            .tokens
            .insert(token.recipient_id, token.clone());
        Ok(())
    }

    async fn merge(
        &self,
        recipient_id: Uuid,
        merge: TokenMerge,
        updated_at: OffsetDateTime,
    ) -> Result<Option<DeviceToken>> {
        let mut state = self.state.write().await;
        let Some(token) = state.tokens.get_mut(&recipient_id) else {
            return Ok(None);
        };

        if let Some(value) = merge.token_value {
            token.token_value = value;
        }
        if let Some(enabled) = merge.enabled {
            token.enabled = enabled;
        }
        if let Some(disabled_at) = merge.disabled_at {
            token.disabled_at = Some(disabled_at);
        }
        token.updated_at = updated_at;

        Ok(Some(token.clone()))
    }
}

#[async_trait]
impl AskStore for MemoryStore {
    async fn get(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
    ) -> Result<Option<PermissionAskRecord>> {
        let key = (recipient_id, device.clone());
        Ok(self.state.read().await.asks.get(&key).cloned())
    }

    async fn insert(&self, record: &PermissionAskRecord) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = (record.recipient_id, record.device.clone());
        if state.asks.contains_key(&key) {
            return Ok(false);
        }
        state.asks.insert(key, record.clone());
        Ok(true)
    }
}

#[async_trait]
impl JobQueue for MemoryStore {
    async fn enqueue(&self, job: &DispatchJob) -> Result<()> {
        self.state.write().await.jobs.push(job.clone());
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, entry: &DispatchHistoryEntry) -> Result<()> {
        self.state.write().await.history.push(entry.clone());
        Ok(())
    }

    async fn list_since(&self, since: OffsetDateTime) -> Result<Vec<DispatchHistoryEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .history
            .iter()
            .filter(|entry| entry.created_at >= since)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }
}

#[async_trait]
impl RecipientDirectory for MemoryStore {
    async fn list(&self) -> Result<Vec<Recipient>> {
        Ok(self.state.read().await.recipients.clone())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
