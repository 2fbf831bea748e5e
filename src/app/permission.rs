//! One-time notification permission prompt.
//!
//! The prompt is offered at most once per (recipient, device). The native
//! permission request itself needs a [`UserGesture`], which only UI event
//! handlers create, so a timer can schedule the prompt but never issue the
//! request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::agent::BackgroundAgentRegistrar;
use crate::app::capability::CapabilityProbe;
use crate::app::error::PushError;
use crate::app::tokens::TokenLifecycleManager;
use crate::domain::capability::{CapabilitySnapshot, Environment, Guidance};
use crate::domain::permission::{DeviceMarker, NativePermission, PermissionAskRecord, PromptAnswer};
use crate::domain::token::DeviceToken;
use crate::infra::store::AskStore;

pub const DEFAULT_PROMPT_DELAY: Duration = Duration::from_millis(2000);

/// Evidence that the caller runs inside a user-initiated event handler.
#[derive(Debug)]
pub struct UserGesture {
    event: String,
}

impl UserGesture {
    pub fn from_event(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

/// The platform's native notification permission.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    fn current(&self) -> NativePermission;

    async fn request(&self, gesture: &UserGesture) -> Result<NativePermission>;
}

/// A prompt the UI should show after `delay`. Answering it requires a gesture.
#[derive(Debug)]
pub struct PendingPrompt {
    pub recipient_id: Uuid,
    pub device: DeviceMarker,
    pub delay: Duration,
    snapshot: CapabilitySnapshot,
}

#[derive(Debug)]
pub enum FirstLoadOutcome {
    AlreadyAsked,
    Unsupported(Guidance),
    Registered(DeviceToken),
    GrantedWithoutToken(PushError),
    Denied,
    Prompt(PendingPrompt),
}

#[derive(Debug)]
pub enum PromptOutcome {
    Granted(DeviceToken),
    /// Permission granted but no token could be stored.
    GrantedWithoutToken(PushError),
    Denied,
    Dismissed,
    /// The native request itself errored.
    Failed(String),
}

impl PromptOutcome {
    /// The UI offers a manual retry button; nothing retries on its own.
    pub fn needs_manual_retry(&self) -> bool {
        match self {
            Self::GrantedWithoutToken(err) => err.is_retryable(),
            Self::Failed(_) => true,
            Self::Granted(_) | Self::Denied | Self::Dismissed => false,
        }
    }
}

pub struct PermissionGate {
    asks: Arc<dyn AskStore>,
    prompt: Arc<dyn PermissionPrompt>,
    tokens: Arc<TokenLifecycleManager>,
    registrar: Arc<BackgroundAgentRegistrar>,
    prompt_delay: Duration,
    asked: Mutex<HashSet<(Uuid, DeviceMarker)>>,
}

impl PermissionGate {
    pub fn new(
        asks: Arc<dyn AskStore>,
        prompt: Arc<dyn PermissionPrompt>,
        tokens: Arc<TokenLifecycleManager>,
        registrar: Arc<BackgroundAgentRegistrar>,
        prompt_delay: Duration,
    ) -> Self {
        Self {
            asks,
            prompt,
            tokens,
            registrar,
            prompt_delay,
            asked: Mutex::new(HashSet::new()),
        }
    }

    pub async fn on_first_load(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
        env: &Environment,
    ) -> Result<FirstLoadOutcome, PushError> {
        if self.already_asked(recipient_id, device).await? {
            return Ok(FirstLoadOutcome::AlreadyAsked);
        }

        let snapshot = CapabilityProbe::probe(env);
        if let Some(guidance) = snapshot.guidance() {
            debug!(recipient_id = %recipient_id, guidance = ?guidance, "push unsupported, prompt not offered");
            return Ok(FirstLoadOutcome::Unsupported(guidance));
        }

        match self.prompt.current() {
            NativePermission::Granted => {
                // Claim the device before the registration await so a
                // concurrent first load sees it as asked.
                let claimed = self
                    .asked
                    .lock()
                    .await
                    .insert((recipient_id, device.clone()));
                if !claimed {
                    return Ok(FirstLoadOutcome::AlreadyAsked);
                }

                let outcome = match self.register(recipient_id, &snapshot).await {
                    Ok(token) => FirstLoadOutcome::Registered(token),
                    Err(err) => {
                        warn!(error = %err, recipient_id = %recipient_id, "silent registration failed");
                        FirstLoadOutcome::GrantedWithoutToken(err)
                    }
                };
                self.mark(recipient_id, device, PromptAnswer::Granted).await;
                Ok(outcome)
            }
            NativePermission::Denied => {
                self.mark(recipient_id, device, PromptAnswer::Denied).await;
                Ok(FirstLoadOutcome::Denied)
            }
            NativePermission::Default => Ok(FirstLoadOutcome::Prompt(PendingPrompt {
                recipient_id,
                device: device.clone(),
                delay: self.prompt_delay,
                snapshot,
            })),
        }
    }

    /// The user tapped "enable" on the prompt.
    pub async fn accept(&self, pending: PendingPrompt, gesture: UserGesture) -> PromptOutcome {
        self.request_and_register(
            pending.recipient_id,
            &pending.device,
            &pending.snapshot,
            &gesture,
        )
        .await
    }

    /// The user closed the prompt without answering.
    pub async fn dismiss(&self, pending: PendingPrompt) {
        self.mark(pending.recipient_id, &pending.device, PromptAnswer::Dismissed)
            .await;
    }

    /// Manual retry after a failed or token-less grant. Ignores the ask record.
    pub async fn retry(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
        env: &Environment,
        gesture: UserGesture,
    ) -> Result<PromptOutcome, PushError> {
        let snapshot = CapabilityProbe::require_supported(env)?;
        Ok(self
            .request_and_register(recipient_id, device, &snapshot, &gesture)
            .await)
    }

    pub async fn already_asked(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
    ) -> Result<bool, PushError> {
        let key = (recipient_id, device.clone());
        if self.asked.lock().await.contains(&key) {
            return Ok(true);
        }

        let record = self
            .asks
            .get(recipient_id, device)
            .await
            .map_err(PushError::store)?;
        if record.is_some() {
            self.asked.lock().await.insert(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn request_and_register(
        &self,
        recipient_id: Uuid,
        device: &DeviceMarker,
        snapshot: &CapabilitySnapshot,
        gesture: &UserGesture,
    ) -> PromptOutcome {
        debug!(recipient_id = %recipient_id, event = gesture.event(), "requesting notification permission");

        let answer = match self.prompt.request(gesture).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = ?err, recipient_id = %recipient_id, "permission request failed");
                self.mark(recipient_id, device, PromptAnswer::Failed).await;
                return PromptOutcome::Failed(format!("{:#}", err));
            }
        };

        match answer {
            NativePermission::Granted => {
                let outcome = match self.register(recipient_id, snapshot).await {
                    Ok(token) => PromptOutcome::Granted(token),
                    Err(err) => {
                        warn!(error = %err, recipient_id = %recipient_id, "registration after grant failed");
                        PromptOutcome::GrantedWithoutToken(err)
                    }
                };
                self.mark(recipient_id, device, PromptAnswer::Granted).await;
                outcome
            }
            NativePermission::Denied => {
                self.mark(recipient_id, device, PromptAnswer::Denied).await;
                PromptOutcome::Denied
            }
            NativePermission::Default => {
                self.mark(recipient_id, device, PromptAnswer::Dismissed).await;
                PromptOutcome::Dismissed
            }
        }
    }

    async fn register(
        &self,
        recipient_id: Uuid,
        snapshot: &CapabilitySnapshot,
    ) -> Result<DeviceToken, PushError> {
        let agent = self.registrar.ensure_active_agent().await?;
        self.tokens.register(recipient_id, snapshot, &agent).await
    }

    async fn mark(&self, recipient_id: Uuid, device: &DeviceMarker, answer: PromptAnswer) {
        self.asked
            .lock()
            .await
            .insert((recipient_id, device.clone()));

        let record = PermissionAskRecord {
            recipient_id,
            device: device.clone(),
            answer,
            asked_at: OffsetDateTime::now_utc(),
        };
        match self.asks.insert(&record).await {
            Ok(true) => info!(recipient_id = %recipient_id, answer = answer.as_db(), "permission prompt answered"),
            Ok(false) => debug!(recipient_id = %recipient_id, "permission ask already recorded"),
            // The session cache still suppresses the prompt until reload.
            Err(err) => warn!(error = ?err, recipient_id = %recipient_id, "failed to record permission ask"),
        }
    }
}
