use std::time::Duration;

use thiserror::Error;

use crate::domain::capability::Guidance;
use crate::domain::dispatch::DispatchHistoryEntry;

/// Failures of the push core. None of them is fatal to the host: capability,
/// permission and agent errors become UI state, dispatch errors go back to
/// the operator.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    #[error("push notifications unavailable: {guidance}")]
    CapabilityUnsupported { guidance: Guidance },

    #[error("notification permission denied")]
    PermissionDenied,

    #[error("notification permission request failed: {0}")]
    PermissionRequestFailed(String),

    #[error("background agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("background agent did not activate within {0:?}")]
    AgentTimeout(Duration),

    #[error("token request failed: {0}")]
    TokenRequestFailed(String),

    #[error("no recipients selected")]
    EmptyAudience,

    #[error("title and body are required")]
    NoContent,

    #[error("{failed} dispatch jobs could not be queued")]
    PartialDispatchFailure {
        failed: usize,
        entry: DispatchHistoryEntry,
    },

    #[error("store error: {0}")]
    Store(String),
}

impl PushError {
    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", err))
    }

    /// Whether trying again (always via an explicit user or operator action)
    /// can succeed without something outside the app changing first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CapabilityUnsupported { .. } | Self::PermissionDenied => false,
            Self::PermissionRequestFailed(_) => true,
            Self::AgentUnavailable(_) | Self::AgentTimeout(_) => true,
            Self::TokenRequestFailed(_) | Self::Store(_) => true,
            Self::EmptyAudience | Self::NoContent => false,
            Self::PartialDispatchFailure { .. } => true,
        }
    }
}
