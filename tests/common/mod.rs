#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::watch;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

use beacon::app::agent::{AgentHandle, AgentRuntime, AgentState};
use beacon::app::permission::{PermissionPrompt, UserGesture};
use beacon::app::session::{Collaborators, PushSession, SessionSettings};
use beacon::app::tokens::PushProvider;
use beacon::config::{AppConfig, StoreMode};
use beacon::domain::capability::Environment;
use beacon::domain::dispatch::DispatchJob;
use beacon::domain::permission::NativePermission;
use beacon::domain::recipient::Recipient;
use beacon::domain::token::{DeviceToken, Platform};
use beacon::infra::memory::MemoryStore;
use beacon::infra::store::{JobQueue, TokenStore};
use beacon::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";
pub const TEST_SCOPE: &str = "https://coach.example/firebase-messaging-sw.js";

pub fn test_config() -> AppConfig {
    AppConfig {
        http_addr: "127.0.0.1:0".to_string(),
        store_mode: StoreMode::Memory,
        database_url: None,
        db_max_connections: 5,
        db_connect_timeout_seconds: 5,
        db_idle_timeout_seconds: 0,
        db_max_lifetime_seconds: 1800,
        admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
        agent_scope_url: scope(),
        agent_activation_timeout_seconds: 15,
        vapid_public_key: None,
        history_window_days: 30,
        prompt_delay_ms: 2000,
    }
}

pub fn scope() -> Url {
    Url::parse(TEST_SCOPE).unwrap()
}

// ---------------------------------------------------------------------------
// TestApp: a router over a fresh in-memory store per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub store: MemoryStore,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = MemoryStore::new();
        let state = AppState::from_store(Arc::new(store.clone()), &config);
        Self::from_state(store, state)
    }

    /// Router over a hand-assembled state, e.g. with a failing queue.
    pub fn from_state(store: MemoryStore, state: AppState) -> Self {
        let router = beacon::http::router(state.clone());
        TestApp {
            router,
            store,
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None, &[]).await
    }

    /// POST with an admin token in the x-admin-token header.
    pub async fn post_admin(
        &self,
        path: &str,
        body: Value,
        admin_token: Option<&str>,
    ) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    /// GET with an admin token in the x-admin-token header.
    pub async fn get_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::GET, path, None, &headers).await
    }
}

// ---------------------------------------------------------------------------
// Test data helpers
// ---------------------------------------------------------------------------

pub fn recipient(name: &str) -> Recipient {
    Recipient {
        id: Uuid::new_v4(),
        display_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        last_check_at: None,
        subscription_expiry_at: None,
    }
}

pub fn token_for(recipient_id: Uuid, enabled: bool) -> DeviceToken {
    let now = OffsetDateTime::now_utc();
    DeviceToken {
        recipient_id,
        token_value: format!("token-{}", recipient_id),
        platform: Platform::AndroidOrWeb,
        installed_as_standalone_app: false,
        enabled,
        created_at: now,
        updated_at: now,
        disabled_at: if enabled { None } else { Some(now) },
    }
}

pub async fn seed_token(store: &MemoryStore, recipient_id: Uuid, enabled: bool) -> DeviceToken {
    let token = token_for(recipient_id, enabled);
    store.set(&token).await.unwrap();
    token
}

/// A desktop browser with everything push needs.
pub fn supported_env() -> Environment {
    Environment {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) Chrome/126.0".to_string(),
        notification_api: true,
        background_agent_api: true,
        push_manager: true,
        secure_context: true,
        ..Environment::default()
    }
}

/// Mobile Safari in a regular tab: all APIs present, not installed.
pub fn ios_tab_env() -> Environment {
    Environment {
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) Safari/604.1"
            .to_string(),
        ..supported_env()
    }
}

pub fn gesture() -> UserGesture {
    UserGesture::from_event("click")
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Agent host. Registrations start `installing` and turn `active` after
/// `activation_delay`, unless the runtime is stalled.
pub struct FakeRuntime {
    pub registrations: AtomicUsize,
    pub activation_delay: Duration,
    pub stalled: AtomicBool,
    pub fail_register: AtomicBool,
    current: Mutex<Option<(AgentHandle, Arc<watch::Sender<AgentState>>)>>,
}

impl FakeRuntime {
    pub fn new(activation_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            registrations: AtomicUsize::new(0),
            activation_delay,
            stalled: AtomicBool::new(false),
            fail_register: AtomicBool::new(false),
            current: Mutex::new(None),
        })
    }

    pub fn stalled() -> Arc<Self> {
        let runtime = Self::new(Duration::ZERO);
        runtime.stalled.store(true, Ordering::SeqCst);
        runtime
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentRuntime for FakeRuntime {
    async fn get_registration(&self, _scope: &Url) -> Result<Option<AgentHandle>> {
        Ok(self
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|(handle, _)| handle.clone()))
    }

    async fn register(&self, scope: &Url) -> Result<AgentHandle> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(anyhow!("agent script failed to load"));
        }
        let attempt = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;

        let (tx, rx) = watch::channel(AgentState::Installing);
        let tx = Arc::new(tx);
        let handle = AgentHandle::new(format!("agent-{}", attempt), scope.clone(), rx);
        *self.current.lock().unwrap() = Some((handle.clone(), tx.clone()));

        if !self.stalled.load(Ordering::SeqCst) {
            let delay = self.activation_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(AgentState::Waiting);
                let _ = tx.send(AgentState::Active);
            });
        }

        Ok(handle)
    }
}

/// Issues `token-1`, `token-2`, ... after `delay`.
pub struct FakeProvider {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub failing: AtomicBool,
    pub fixed: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            failing: AtomicBool::new(false),
            fixed: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushProvider for FakeProvider {
    async fn request_token(&self, _agent: &AgentHandle) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("messaging service unreachable"));
        }
        if let Some(fixed) = self.fixed.lock().unwrap().clone() {
            return Ok(fixed);
        }
        Ok(format!("token-{}", call))
    }
}

/// Native permission. `answer` is what the next request resolves to.
pub struct FakePrompt {
    pub current: Mutex<NativePermission>,
    pub answer: Mutex<Result<NativePermission, String>>,
    pub requests: AtomicUsize,
}

impl FakePrompt {
    pub fn new(current: NativePermission) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(current),
            answer: Mutex::new(Ok(NativePermission::Granted)),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn answering(current: NativePermission, answer: Result<NativePermission, String>) -> Arc<Self> {
        let prompt = Self::new(current);
        *prompt.answer.lock().unwrap() = answer;
        prompt
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionPrompt for FakePrompt {
    fn current(&self) -> NativePermission {
        *self.current.lock().unwrap()
    }

    async fn request(&self, _gesture: &UserGesture) -> Result<NativePermission> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.lock().unwrap().clone();
        match answer {
            Ok(answer) => {
                *self.current.lock().unwrap() = answer;
                Ok(answer)
            }
            Err(message) => Err(anyhow!(message)),
        }
    }
}

/// Queue that rejects jobs for the listed recipients and stores the rest.
pub struct FlakyQueue {
    pub inner: MemoryStore,
    pub reject: HashSet<Uuid>,
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(&self, job: &DispatchJob) -> Result<()> {
        if self.reject.contains(&job.recipient_id) {
            return Err(anyhow!("queue write rejected"));
        }
        self.inner.enqueue(job).await
    }
}

// ---------------------------------------------------------------------------
// Session builder
// ---------------------------------------------------------------------------

pub struct SessionFixture {
    pub store: MemoryStore,
    pub runtime: Arc<FakeRuntime>,
    pub provider: Arc<FakeProvider>,
    pub prompt: Arc<FakePrompt>,
    pub session: PushSession,
}

impl SessionFixture {
    pub fn new(prompt: Arc<FakePrompt>) -> Self {
        Self::build(
            MemoryStore::new(),
            FakeRuntime::new(Duration::from_millis(5)),
            FakeProvider::new(),
            prompt,
        )
    }

    pub fn build(
        store: MemoryStore,
        runtime: Arc<FakeRuntime>,
        provider: Arc<FakeProvider>,
        prompt: Arc<FakePrompt>,
    ) -> Self {
        let settings = SessionSettings {
            agent_scope: scope(),
            activation_timeout: Duration::from_secs(2),
            prompt_delay: Duration::from_millis(2000),
        };
        let session = PushSession::new(
            settings,
            Collaborators {
                tokens: Arc::new(store.clone()),
                asks: Arc::new(store.clone()),
                provider: provider.clone(),
                runtime: runtime.clone(),
                prompt: prompt.clone(),
            },
        );
        Self {
            store,
            runtime,
            provider,
            prompt,
            session,
        }
    }
}
