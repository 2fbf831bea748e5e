use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exactly one filter selects an audience; filters never combine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentFilter {
    All,
    ActiveOnly,
    ExpiredOnly,
    InactivitySince { threshold_days: u32 },
    ExplicitIdSet { ids: HashSet<Uuid> },
}

impl SegmentFilter {
    pub fn label(&self) -> String {
        match self {
            Self::All => "all recipients".to_string(),
            Self::ActiveOnly => "active subscriptions".to_string(),
            Self::ExpiredOnly => "expired subscriptions".to_string(),
            Self::InactivitySince { threshold_days } => {
                format!("no check-in for {}+ days", threshold_days)
            }
            Self::ExplicitIdSet { ids } => format!("{} selected recipients", ids.len()),
        }
    }
}
