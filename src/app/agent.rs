//! Background execution agent registration.
//!
//! Every token operation needs an active agent. Registration is single-flight
//! per registrar: callers that arrive while an attempt is running share it
//! instead of registering again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::error::PushError;

pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    None,
    Installing,
    Waiting,
    Active,
}

#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: String,
    scope: Url,
    state: watch::Receiver<AgentState>,
}

impl AgentHandle {
    pub fn new(id: impl Into<String>, scope: Url, state: watch::Receiver<AgentState>) -> Self {
        Self {
            id: id.into(),
            scope,
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    async fn wait_until_active(&mut self) -> Result<(), PushError> {
        loop {
            let state = *self.state.borrow_and_update();
            match state {
                AgentState::Active => return Ok(()),
                AgentState::None => {
                    return Err(PushError::AgentUnavailable(
                        "registration was discarded before activating".to_string(),
                    ))
                }
                AgentState::Installing | AgentState::Waiting => {}
            }

            if self.state.changed().await.is_err() {
                return Err(PushError::AgentUnavailable(
                    "agent state is no longer observable".to_string(),
                ));
            }
        }
    }
}

/// The platform facility that hosts background agents.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn get_registration(&self, scope: &Url) -> Result<Option<AgentHandle>>;

    async fn register(&self, scope: &Url) -> Result<AgentHandle>;
}

type Activation = Shared<BoxFuture<'static, Result<AgentHandle, PushError>>>;

struct InFlight {
    attempt: u64,
    activation: Activation,
}

#[derive(Default)]
struct Slot {
    next_attempt: u64,
    current: Option<InFlight>,
}

pub struct BackgroundAgentRegistrar {
    runtime: Arc<dyn AgentRuntime>,
    scope: Url,
    activation_timeout: Duration,
    slot: Mutex<Slot>,
}

impl BackgroundAgentRegistrar {
    pub fn new(runtime: Arc<dyn AgentRuntime>, scope: Url, activation_timeout: Duration) -> Self {
        Self {
            runtime,
            scope,
            activation_timeout,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Resolve to a handle whose agent is active, registering it if needed.
    pub async fn ensure_active_agent(&self) -> Result<AgentHandle, PushError> {
        let (attempt, activation) = {
            let mut slot = self.slot.lock().await;
            match slot.current.as_ref() {
                Some(in_flight) => {
                    debug!(attempt = in_flight.attempt, "joining in-flight agent activation");
                    (in_flight.attempt, in_flight.activation.clone())
                }
                None => {
                    let attempt = slot.next_attempt;
                    slot.next_attempt += 1;
                    let activation = activate(
                        self.runtime.clone(),
                        self.scope.clone(),
                        self.activation_timeout,
                    )
                    .boxed()
                    .shared();
                    slot.current = Some(InFlight {
                        attempt,
                        activation: activation.clone(),
                    });
                    (attempt, activation)
                }
            }
        };

        let result = activation.await;

        let mut slot = self.slot.lock().await;
        if slot
            .current
            .as_ref()
            .is_some_and(|in_flight| in_flight.attempt == attempt)
        {
            slot.current = None;
        }

        result
    }

    /// Current registration state, without registering anything.
    pub async fn current_state(&self) -> Result<Option<AgentState>, PushError> {
        let handle = self
            .runtime
            .get_registration(&self.scope)
            .await
            .map_err(unavailable)?;
        Ok(handle.map(|handle| handle.state()))
    }
}

async fn activate(
    runtime: Arc<dyn AgentRuntime>,
    scope: Url,
    timeout: Duration,
) -> Result<AgentHandle, PushError> {
    let existing = runtime
        .get_registration(&scope)
        .await
        .map_err(unavailable)?
        .filter(|handle| handle.state() != AgentState::None);

    let mut handle = match existing {
        Some(handle) => handle,
        None => {
            info!(scope = %scope, "registering background agent");
            runtime.register(&scope).await.map_err(unavailable)?
        }
    };

    match handle.state() {
        AgentState::Active => return Ok(handle),
        AgentState::None => {
            return Err(PushError::AgentUnavailable(
                "registration did not produce an agent".to_string(),
            ))
        }
        state @ (AgentState::Installing | AgentState::Waiting) => {
            debug!(scope = %scope, state = ?state, "waiting for background agent to activate");
        }
    }

    match tokio::time::timeout(timeout, handle.wait_until_active()).await {
        Ok(Ok(())) => {
            info!(scope = %scope, agent_id = handle.id(), "background agent active");
            Ok(handle)
        }
        Ok(Err(err)) => Err(err),
        Err(_) => {
            warn!(scope = %scope, timeout = ?timeout, "background agent activation timed out");
            Err(PushError::AgentTimeout(timeout))
        }
    }
}

fn unavailable(err: anyhow::Error) -> PushError {
    PushError::AgentUnavailable(format!("{:#}", err))
}
