use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Stable, opaque identifier for one app install on one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceMarker(String);

impl DeviceMarker {
    pub fn from_fingerprint(fingerprint: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativePermission {
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptAnswer {
    Granted,
    Denied,
    Dismissed,
    Failed,
}

impl PromptAnswer {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            "dismissed" => Some(Self::Dismissed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Dismissed => "dismissed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionAskRecord {
    pub recipient_id: Uuid,
    pub device: DeviceMarker,
    pub answer: PromptAnswer,
    #[serde(with = "time::serde::rfc3339")]
    pub asked_at: OffsetDateTime,
}
