use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToken {
    pub recipient_id: Uuid,
    pub token_value: String,
    pub platform: Platform,
    pub installed_as_standalone_app: bool,
    pub enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub disabled_at: Option<OffsetDateTime>,
}

impl DeviceToken {
    /// A token is only worth sending to while enabled, whatever its value.
    pub fn is_sendable(&self) -> bool {
        self.enabled && !self.token_value.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ios,
    AndroidOrWeb,
}

impl Platform {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "ios" => Some(Self::Ios),
            "android_or_web" => Some(Self::AndroidOrWeb),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::AndroidOrWeb => "android_or_web",
        }
    }
}

/// Partial update applied to an existing token record. `None` fields are left
/// untouched; a merge never creates a record.
#[derive(Debug, Clone, Default)]
pub struct TokenMerge {
    pub token_value: Option<String>,
    pub enabled: Option<bool>,
    pub disabled_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    NoToken,
    Requesting,
    Active,
    Refreshing,
    Disabled,
}

impl TokenState {
    pub fn of(token: Option<&DeviceToken>) -> Self {
        match token {
            None => Self::NoToken,
            Some(token) if token.enabled => Self::Active,
            Some(_) => Self::Disabled,
        }
    }
}
