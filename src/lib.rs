pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use url::Url;

use crate::app::dispatch::DispatchCoordinator;
use crate::config::AppConfig;
use crate::infra::store::{HistoryStore, JobQueue, RecipientDirectory, StoreHealth, TokenStore};

#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn TokenStore>,
    pub queue: Arc<dyn JobQueue>,
    pub history: Arc<dyn HistoryStore>,
    pub directory: Arc<dyn RecipientDirectory>,
    pub health: Arc<dyn StoreHealth>,
    pub admin_token: Option<String>,
    pub history_window_days: u32,
    pub vapid_public_key: Option<String>,
    pub agent_scope: Url,
}

impl AppState {
    pub fn from_store<S>(store: Arc<S>, config: &AppConfig) -> Self
    where
        S: TokenStore + JobQueue + HistoryStore + RecipientDirectory + StoreHealth + 'static,
    {
        Self {
            tokens: store.clone(),
            queue: store.clone(),
            history: store.clone(),
            directory: store.clone(),
            health: store,
            admin_token: config.admin_token.clone(),
            history_window_days: config.history_window_days,
            vapid_public_key: config.vapid_public_key.clone(),
            agent_scope: config.agent_scope_url.clone(),
        }
    }

    pub fn dispatcher(&self) -> DispatchCoordinator {
        DispatchCoordinator::new(self.tokens.clone(), self.queue.clone(), self.history.clone())
    }
}
