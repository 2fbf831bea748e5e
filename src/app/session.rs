//! Per-session wiring of the push components.
//!
//! Everything that must not outlive a session (in-flight agent activation,
//! the "already asked" cache, the foreground listener) lives on the instances
//! created here, not in globals.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::app::agent::{AgentRuntime, AgentState, BackgroundAgentRegistrar};
use crate::app::capability::CapabilityProbe;
use crate::app::error::PushError;
use crate::app::listener::ForegroundListener;
use crate::app::permission::{
    FirstLoadOutcome, PermissionGate, PermissionPrompt, PromptOutcome, UserGesture,
};
use crate::app::tokens::{PushProvider, RefreshOutcome, TokenLifecycleManager};
use crate::config::AppConfig;
use crate::domain::capability::{CapabilitySnapshot, Environment, Guidance};
use crate::domain::permission::{DeviceMarker, NativePermission};
use crate::domain::token::{DeviceToken, TokenState};
use crate::infra::store::{AskStore, TokenStore};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub agent_scope: Url,
    pub activation_timeout: Duration,
    pub prompt_delay: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            agent_scope: config.agent_scope_url.clone(),
            activation_timeout: Duration::from_secs(config.agent_activation_timeout_seconds),
            prompt_delay: Duration::from_millis(config.prompt_delay_ms),
        }
    }
}

pub struct Collaborators {
    pub tokens: Arc<dyn TokenStore>,
    pub asks: Arc<dyn AskStore>,
    pub provider: Arc<dyn PushProvider>,
    pub runtime: Arc<dyn AgentRuntime>,
    pub prompt: Arc<dyn PermissionPrompt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub capability: CapabilitySnapshot,
    pub overall_supported: bool,
    pub guidance: Option<Guidance>,
    pub native_permission: NativePermission,
    pub agent_state: Option<AgentState>,
    pub token_state: Option<TokenState>,
    pub token_enabled: Option<bool>,
    pub listener_active: bool,
    pub problems: Vec<String>,
}

pub struct PushSession {
    registrar: Arc<BackgroundAgentRegistrar>,
    tokens: Arc<TokenLifecycleManager>,
    gate: PermissionGate,
    prompt: Arc<dyn PermissionPrompt>,
    listener: ForegroundListener,
}

impl PushSession {
    pub fn new(settings: SessionSettings, collaborators: Collaborators) -> Self {
        let registrar = Arc::new(BackgroundAgentRegistrar::new(
            collaborators.runtime,
            settings.agent_scope,
            settings.activation_timeout,
        ));
        let tokens = Arc::new(TokenLifecycleManager::new(
            collaborators.tokens,
            collaborators.provider,
        ));
        let gate = PermissionGate::new(
            collaborators.asks,
            collaborators.prompt.clone(),
            tokens.clone(),
            registrar.clone(),
            settings.prompt_delay,
        );

        Self {
            registrar,
            tokens,
            gate,
            prompt: collaborators.prompt,
            listener: ForegroundListener::new(),
        }
    }

    pub fn registrar(&self) -> &BackgroundAgentRegistrar {
        &self.registrar
    }

    pub fn tokens(&self) -> &TokenLifecycleManager {
        &self.tokens
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn listener(&self) -> &ForegroundListener {
        &self.listener
    }

    pub async fn on_first_load(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
        env: &Environment,
    ) -> Result<FirstLoadOutcome, PushError> {
        self.gate.on_first_load(recipient_id, device, env).await
    }

    /// Explicit opt-in from a settings screen.
    pub async fn enable(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
        env: &Environment,
        gesture: UserGesture,
    ) -> Result<DeviceToken, PushError> {
        let snapshot = CapabilityProbe::require_supported(env)?;

        match self.prompt.current() {
            NativePermission::Denied => Err(PushError::PermissionDenied),
            NativePermission::Granted => {
                let agent = self.registrar.ensure_active_agent().await?;
                self.tokens.register(recipient_id, &snapshot, &agent).await
            }
            NativePermission::Default => {
                match self.gate.retry(recipient_id, device, env, gesture).await? {
                    PromptOutcome::Granted(token) => Ok(token),
                    PromptOutcome::GrantedWithoutToken(err) => Err(err),
                    PromptOutcome::Denied | PromptOutcome::Dismissed => {
                        Err(PushError::PermissionDenied)
                    }
                    PromptOutcome::Failed(reason) => Err(PushError::PermissionRequestFailed(reason)),
                }
            }
        }
    }

    pub async fn disable(&self, recipient_id: Uuid) -> Result<Option<DeviceToken>, PushError> {
        self.tokens.disable(recipient_id).await
    }

    /// Handler for the provider's token-rotation callback.
    pub async fn background_refresh(&self, recipient_id: Uuid) -> Result<RefreshOutcome, PushError> {
        let agent = self.registrar.ensure_active_agent().await?;
        self.tokens.refresh(recipient_id, &agent).await
    }

    /// Everything an admin needs to see why pushes are not arriving on this
    /// device. Never registers anything.
    pub async fn diagnostics(&self, recipient_id: Uuid, env: &Environment) -> DiagnosticsReport {
        let capability = CapabilityProbe::probe(env);
        let mut problems = Vec::new();

        let agent_state = match self.registrar.current_state().await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "agent state lookup failed during diagnostics");
                problems.push(err.to_string());
                None
            }
        };

        let (token_state, token_enabled) = match self.tokens.get(recipient_id).await {
            Ok(token) => (
                Some(TokenState::of(token.as_ref())),
                token.map(|token| token.enabled),
            ),
            Err(err) => {
                problems.push(err.to_string());
                (None, None)
            }
        };

        if let Some(guidance) = capability.guidance() {
            problems.push(guidance.message().to_string());
        }

        DiagnosticsReport {
            overall_supported: capability.overall_supported(),
            guidance: capability.guidance(),
            capability,
            native_permission: self.prompt.current(),
            agent_state,
            token_state,
            token_enabled,
            listener_active: self.listener.is_active(),
            problems,
        }
    }
}
