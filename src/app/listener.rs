//! Foreground delivery listening.
//!
//! Provider callbacks publish into a broadcast channel; a session holds at
//! most one listener on it. Subscribing again replaces the previous listener,
//! so callers never have to tear anything down first.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForegroundMessage {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Value,
}

struct Subscription {
    task: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct ForegroundListener {
    source: broadcast::Sender<ForegroundMessage>,
    active: Mutex<Option<Subscription>>,
}

impl Default for ForegroundListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundListener {
    pub fn new() -> Self {
        let (source, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            source,
            active: Mutex::new(None),
        }
    }

    /// Entry point for the provider's foreground callback. Returns the number
    /// of receivers the message was handed to.
    pub fn deliver(&self, message: ForegroundMessage) -> usize {
        self.source.send(message).unwrap_or(0)
    }

    /// Start listening with `handler`, stopping any previous listener first.
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ForegroundMessage) + Send + Sync + 'static,
    {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.take().is_some() {
            debug!("replacing foreground listener");
        }

        let mut receiver = self.source.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => handler(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "foreground listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *active = Some(Subscription { task });
    }

    /// Returns whether a listener was running.
    pub fn stop(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|subscription| !subscription.task.is_finished())
    }
}
