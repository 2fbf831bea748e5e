use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::dispatch::{DispatchHistoryEntry, DispatchJob};
use crate::domain::permission::{DeviceMarker, PermissionAskRecord, PromptAnswer};
use crate::domain::recipient::Recipient;
use crate::domain::token::{DeviceToken, Platform, TokenMerge};
use crate::infra::db::Db;
use crate::infra::store::{
    AskStore, HistoryStore, JobQueue, RecipientDirectory, StoreHealth, TokenStore,
};

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn token_from_row(row: &PgRow) -> Result<DeviceToken> {
    let platform: String = row.get("platform");
    let platform = Platform::from_db(&platform)
        .ok_or_else(|| anyhow!("unknown platform in push_device_tokens: {}", platform))?;

    Ok(DeviceToken {
        recipient_id: row.get("recipient_id"),
        token_value: row.get("token_value"),
        platform,
        installed_as_standalone_app: row.get("installed_as_standalone_app"),
        enabled: row.get("enabled"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        disabled_at: row.get("disabled_at"),
    })
}

#[async_trait]
impl TokenStore for PgStore {
    async fn get(&self, recipient_id: Uuid) -> Result<Option<DeviceToken>> {
        let row = sqlx::query(
            "SELECT recipient_id, token_value, platform, installed_as_standalone_app, \
                    enabled, created_at, updated_at, disabled_at \
             FROM push_device_tokens WHERE recipient_id = $1",
        )
        .bind(recipient_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn set(&self, token: &DeviceToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO push_device_tokens \
                (recipient_id, token_value, platform, installed_as_standalone_app, \
                 enabled, created_at, updated_at, disabled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (recipient_id) DO UPDATE \
             SET token_value = EXCLUDED.token_value, \
                 platform = EXCLUDED.platform, \
                 installed_as_standalone_app = EXCLUDED.installed_as_standalone_app, \
                 enabled = EXCLUDED.enabled, \
                 created_at = EXCLUDED.created_at, \
                 updated_at = EXCLUDED.updated_at, \
                 disabled_at = EXCLUDED.disabled_at",
        )
        .bind(token.recipient_id)
        .bind(&token.token_value)
        .bind(token.platform.as_db())
        .bind(token.installed_as_standalone_app)
        .bind(token.enabled)
        .bind(token.created_at)
        .bind(token.updated_at)
        .bind(token.disabled_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn merge(
        &self,
        recipient_id: Uuid,
        merge: TokenMerge,
        updated_at: OffsetDateTime,
    ) -> Result<Option<DeviceToken>> {
        // Single statement, so a concurrent disable is never overwritten by a
        // refresh that read the row earlier.
        let row = sqlx::query(
            "UPDATE push_device_tokens \
             SET token_value = COALESCE($2, token_value), \
                 enabled = COALESCE($3, enabled), \
                 disabled_at = COALESCE($4, disabled_at), \
                 updated_at = $5 \
             WHERE recipient_id = $1 \
             RETURNING recipient_id, token_value, platform, installed_as_standalone_app, \
                       enabled, created_at, updated_at, disabled_at",
        )
        .bind(recipient_id)
        .bind(merge.token_value)
        .bind(merge.enabled)
        .bind(merge.disabled_at)
        .bind(updated_at)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }
}

#[async_trait]
impl AskStore for PgStore {
    async fn get(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
    ) -> Result<Option<PermissionAskRecord>> {
        let row = sqlx::query(
            "SELECT recipient_id, device_marker, answer, asked_at \
             FROM push_permission_asks \
             WHERE recipient_id = $1 AND device_marker = $2",
        )
        .bind(recipient_id)
        .bind(device.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let answer: String = row.get("answer");
        let answer = PromptAnswer::from_db(&answer)
            .ok_or_else(|| anyhow!("unknown answer in push_permission_asks: {}", answer))?;

        Ok(Some(PermissionAskRecord {
            recipient_id: row.get("recipient_id"),
            device: DeviceMarker::from_hash(row.get::<String, _>("device_marker")),
            answer,
            asked_at: row.get("asked_at"),
        }))
    }

    async fn insert(&self, record: &PermissionAskRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO push_permission_asks (recipient_id, device_marker, answer, asked_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (recipient_id, device_marker) DO NOTHING",
        )
        .bind(record.recipient_id)
        .bind(record.device.as_str())
        .bind(record.answer.as_db())
        .bind(record.asked_at)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl JobQueue for PgStore {
    async fn enqueue(&self, job: &DispatchJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO push_queue (id, recipient_id, token_value, title, body, data, created_at, sent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, false)",
        )
        .bind(&job.id)
        .bind(job.recipient_id)
        .bind(&job.token_value)
        .bind(&job.title)
        .bind(&job.body)
        .bind(&job.data)
        .bind(job.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn append(&self, entry: &DispatchHistoryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO push_broadcast_history (id, title, body, recipient_count, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&entry.id)
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(entry.recipient_count as i64)
        .bind(entry.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn list_since(&self, since: OffsetDateTime) -> Result<Vec<DispatchHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, title, body, recipient_count, created_at \
             FROM push_broadcast_history \
             WHERE created_at >= $1 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(since)
        .fetch_all(self.db.pool())
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let count: i64 = row.get("recipient_count");
            entries.push(DispatchHistoryEntry {
                id: row.get("id"),
                title: row.get("title"),
                body: row.get("body"),
                recipient_count: usize::try_from(count).unwrap_or(0),
                created_at: row.get("created_at"),
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl RecipientDirectory for PgStore {
    async fn list(&self) -> Result<Vec<Recipient>> {
        let rows = sqlx::query(
            "SELECT id, display_name, email, last_check_at, subscription_expiry_at \
             FROM push_recipients \
             ORDER BY display_name, id",
        )
        .fetch_all(self.db.pool())
        .await?;

        let recipients = rows
            .into_iter()
            .map(|row| Recipient {
                id: row.get("id"),
                display_name: row.get("display_name"),
                email: row.get("email"),
                last_check_at: row.get("last_check_at"),
                subscription_expiry_at: row.get("subscription_expiry_at"),
            })
            .collect();

        Ok(recipients)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}
