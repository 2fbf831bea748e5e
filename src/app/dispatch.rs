//! Broadcast dispatch: (message, audience) -> queued jobs + one history entry.
//!
//! Every call is independent. Two identical broadcasts queue two sets of jobs
//! and write two history entries; some workflows rely on resending.
//! A successful call means "queued", never "delivered".

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use ulid::Ulid;
use uuid::Uuid;

use crate::app::error::PushError;
use crate::domain::dispatch::{BroadcastRequest, DispatchHistoryEntry, DispatchJob};
use crate::domain::token::DeviceToken;
use crate::infra::store::{HistoryStore, JobQueue, TokenStore};

const ENQUEUE_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct DispatchCoordinator {
    tokens: Arc<dyn TokenStore>,
    queue: Arc<dyn JobQueue>,
    history: Arc<dyn HistoryStore>,
}

impl DispatchCoordinator {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        queue: Arc<dyn JobQueue>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            tokens,
            queue,
            history,
        }
    }

    pub async fn broadcast(
        &self,
        request: BroadcastRequest,
    ) -> Result<DispatchHistoryEntry, PushError> {
        let title = request.title.trim().to_string();
        let body = request.body.trim().to_string();
        if title.is_empty() || body.is_empty() {
            return Err(PushError::NoContent);
        }
        if request.recipient_ids.is_empty() {
            return Err(PushError::EmptyAudience);
        }

        let requested = request.recipient_ids.len();
        let sendable = self.resolve_sendable(&request.recipient_ids).await?;
        let skipped = requested - sendable.len();

        let submitted_at = OffsetDateTime::now_utc();
        let broadcast_id = Ulid::new().to_string();
        let data = job_data(request.data, &broadcast_id);

        let jobs: Vec<DispatchJob> = sendable
            .into_iter()
            .map(|token| DispatchJob {
                id: DispatchJob::job_id(token.recipient_id, submitted_at),
                recipient_id: token.recipient_id,
                token_value: token.token_value,
                title: title.clone(),
                body: body.clone(),
                data: data.clone(),
                created_at: submitted_at,
                sent: false,
            })
            .collect();

        let queue = &self.queue;
        let results: Vec<bool> = stream::iter(jobs)
            .map(|job| async move {
                match queue.enqueue(&job).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(error = ?err, job_id = %job.id, recipient_id = %job.recipient_id, "failed to queue dispatch job");
                        false
                    }
                }
            })
            .buffer_unordered(ENQUEUE_CONCURRENCY)
            .collect()
            .await;

        let queued = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - queued;

        // History only ever counts what is durably queued.
        let entry = DispatchHistoryEntry {
            id: broadcast_id,
            title,
            body,
            recipient_count: queued,
            created_at: submitted_at,
        };
        self.history.append(&entry).await.map_err(|err| {
            error!(error = ?err, broadcast_id = %entry.id, queued, "failed to record broadcast history");
            PushError::store(err)
        })?;

        info!(
            broadcast_id = %entry.id,
            requested,
            queued,
            skipped,
            failed,
            "broadcast queued"
        );

        if failed > 0 {
            return Err(PushError::PartialDispatchFailure { failed, entry });
        }
        Ok(entry)
    }

    /// Broadcasts recorded within the last `days` days, newest first.
    pub async fn history(&self, days: u32) -> Result<Vec<DispatchHistoryEntry>, PushError> {
        let since = OffsetDateTime::now_utc() - Duration::days(i64::from(days));
        self.history
            .list_since(since)
            .await
            .map_err(PushError::store)
    }

    /// Ids without a token or with a disabled one are not errors, just not
    /// sendable. Repeated ids resolve once.
    async fn resolve_sendable(&self, recipient_ids: &[Uuid]) -> Result<Vec<DeviceToken>, PushError> {
        let mut seen = HashSet::with_capacity(recipient_ids.len());
        let mut sendable = Vec::with_capacity(recipient_ids.len());

        for recipient_id in recipient_ids {
            if !seen.insert(*recipient_id) {
                continue;
            }
            let token = self
                .tokens
                .get(*recipient_id)
                .await
                .map_err(PushError::store)?;
            if let Some(token) = token.filter(DeviceToken::is_sendable) {
                sendable.push(token);
            }
        }

        Ok(sendable)
    }
}

fn job_data(payload: Value, broadcast_id: &str) -> Value {
    let mut data = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    data.insert(
        "broadcast_id".to_string(),
        Value::String(broadcast_id.to_string()),
    );
    Value::Object(data)
}
