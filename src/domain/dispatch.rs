use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use ulid::Ulid;
use uuid::Uuid;

/// One queued "send this message to this token" unit. Written as queued;
/// only the delivery provider ever flips `sent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    pub id: String,
    pub recipient_id: Uuid,
    pub token_value: String,
    pub title: String,
    pub body: String,
    pub data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub sent: bool,
}

impl DispatchJob {
    /// `<recipient>_<unix millis>_<ulid>`; the suffix keeps ids unique when
    /// the same recipient is targeted twice within one millisecond.
    pub fn job_id(recipient_id: Uuid, submitted_at: OffsetDateTime) -> String {
        let millis = submitted_at.unix_timestamp_nanos() / 1_000_000;
        format!("{}_{}_{}", recipient_id, millis, Ulid::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchHistoryEntry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub recipient_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub body: String,
    pub recipient_ids: Vec<Uuid>,
    #[serde(default)]
    pub data: Value,
}
