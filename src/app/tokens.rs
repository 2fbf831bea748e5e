//! Per-recipient device token lifecycle.
//!
//! ```text
//! NO_TOKEN -> REQUESTING -> ACTIVE -> REFRESHING -> ACTIVE
//!                              \-> DISABLED -> REQUESTING (re-subscribe)
//! ```
//!
//! `enabled` on the stored record is the only thing that decides whether a
//! recipient can be sent to. A refresh never writes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::agent::{AgentHandle, AgentState};
use crate::app::error::PushError;
use crate::domain::capability::CapabilitySnapshot;
use crate::domain::token::{DeviceToken, Platform, TokenMerge, TokenState};
use crate::infra::store::TokenStore;

/// The delivery provider, as seen by token management.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn request_token(&self, agent: &AgentHandle) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(DeviceToken),
    Unchanged(DeviceToken),
    SkippedDisabled,
    SkippedNoToken,
}

pub struct TokenLifecycleManager {
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn PushProvider>,
    transient: Mutex<HashMap<Uuid, TokenState>>,
}

impl TokenLifecycleManager {
    pub fn new(store: Arc<dyn TokenStore>, provider: Arc<dyn PushProvider>) -> Self {
        Self {
            store,
            provider,
            transient: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, recipient_id: Uuid) -> Result<Option<DeviceToken>, PushError> {
        self.store.get(recipient_id).await.map_err(PushError::store)
    }

    /// Stored state, or the transient one while a request is in flight.
    pub async fn state(&self, recipient_id: Uuid) -> Result<TokenState, PushError> {
        if let Some(state) = self.transient_state(recipient_id) {
            return Ok(state);
        }
        let token = self.get(recipient_id).await?;
        Ok(TokenState::of(token.as_ref()))
    }

    /// Request a fresh token and store it as the recipient's only record,
    /// enabled, replacing whatever was there.
    pub async fn register(
        &self,
        recipient_id: Uuid,
        snapshot: &CapabilitySnapshot,
        agent: &AgentHandle,
    ) -> Result<DeviceToken, PushError> {
        if let Some(guidance) = snapshot.guidance() {
            return Err(PushError::CapabilityUnsupported { guidance });
        }
        require_active(agent)?;

        let _transition = self.enter(recipient_id, TokenState::Requesting);
        let token_value = self.request_token(recipient_id, agent).await?;

        let now = OffsetDateTime::now_utc();
        let token = DeviceToken {
            recipient_id,
            token_value,
            platform: if snapshot.is_ios {
                Platform::Ios
            } else {
                Platform::AndroidOrWeb
            },
            installed_as_standalone_app: snapshot.is_standalone_install,
            enabled: true,
            created_at: now,
            updated_at: now,
            disabled_at: None,
        };

        self.store.set(&token).await.map_err(PushError::store)?;

        info!(
            recipient_id = %recipient_id,
            platform = token.platform.as_db(),
            standalone = token.installed_as_standalone_app,
            "device token registered"
        );
        Ok(token)
    }

    /// Provider-initiated token rotation. A no-op for recipients without a
    /// record or who have opted out, including opt-outs that land while the
    /// provider request is still in flight.
    pub async fn refresh(
        &self,
        recipient_id: Uuid,
        agent: &AgentHandle,
    ) -> Result<RefreshOutcome, PushError> {
        let Some(current) = self.get(recipient_id).await? else {
            debug!(recipient_id = %recipient_id, "refresh skipped, no token on record");
            return Ok(RefreshOutcome::SkippedNoToken);
        };
        if !current.enabled {
            debug!(recipient_id = %recipient_id, "refresh skipped, recipient opted out");
            return Ok(RefreshOutcome::SkippedDisabled);
        }
        require_active(agent)?;

        let _transition = self.enter(recipient_id, TokenState::Refreshing);
        let token_value = self.request_token(recipient_id, agent).await?;
        let unchanged = token_value == current.token_value;

        let merge = TokenMerge {
            token_value: Some(token_value),
            ..TokenMerge::default()
        };
        let merged = self
            .store
            .merge(recipient_id, merge, OffsetDateTime::now_utc())
            .await
            .map_err(PushError::store)?;

        let outcome = match merged {
            None => RefreshOutcome::SkippedNoToken,
            Some(token) if !token.enabled => {
                debug!(recipient_id = %recipient_id, "recipient opted out during refresh, left disabled");
                RefreshOutcome::SkippedDisabled
            }
            Some(token) if unchanged => RefreshOutcome::Unchanged(token),
            Some(token) => {
                info!(recipient_id = %recipient_id, "device token refreshed");
                RefreshOutcome::Refreshed(token)
            }
        };

        Ok(outcome)
    }

    /// Soft-disable. The token value is kept; `enabled = false` alone makes
    /// the recipient unsendable.
    pub async fn disable(&self, recipient_id: Uuid) -> Result<Option<DeviceToken>, PushError> {
        disable_token(self.store.as_ref(), recipient_id).await
    }

    async fn request_token(
        &self,
        recipient_id: Uuid,
        agent: &AgentHandle,
    ) -> Result<String, PushError> {
        let token_value = self.provider.request_token(agent).await.map_err(|err| {
            warn!(error = ?err, recipient_id = %recipient_id, "token request failed");
            PushError::TokenRequestFailed(format!("{:#}", err))
        })?;

        if token_value.trim().is_empty() {
            return Err(PushError::TokenRequestFailed(
                "provider returned an empty token".to_string(),
            ));
        }

        Ok(token_value)
    }

    fn transient_state(&self, recipient_id: Uuid) -> Option<TokenState> {
        self.transient
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&recipient_id)
            .copied()
    }

    fn enter(&self, recipient_id: Uuid, state: TokenState) -> Transition<'_> {
        self.transient
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(recipient_id, state);
        Transition {
            transient: &self.transient,
            recipient_id,
        }
    }
}

/// Clears the transient state when the request finishes, however it ends.
struct Transition<'a> {
    transient: &'a Mutex<HashMap<Uuid, TokenState>>,
    recipient_id: Uuid,
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        self.transient
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.recipient_id);
    }
}

/// Opt-out path shared by the client session and the operator API, which
/// has no provider or agent to hand.
pub async fn disable_token(
    store: &dyn TokenStore,
    recipient_id: Uuid,
) -> Result<Option<DeviceToken>, PushError> {
    let now = OffsetDateTime::now_utc();
    let merge = TokenMerge {
        enabled: Some(false),
        disabled_at: Some(now),
        ..TokenMerge::default()
    };
    let token = store
        .merge(recipient_id, merge, now)
        .await
        .map_err(PushError::store)?;

    match &token {
        Some(_) => info!(recipient_id = %recipient_id, "device token disabled"),
        None => debug!(recipient_id = %recipient_id, "disable requested without a token on record"),
    }

    Ok(token)
}

fn require_active(agent: &AgentHandle) -> Result<(), PushError> {
    match agent.state() {
        AgentState::Active => Ok(()),
        state => Err(PushError::AgentUnavailable(format!(
            "agent {} is {:?}, not active",
            agent.id(),
            state
        ))),
    }
}
