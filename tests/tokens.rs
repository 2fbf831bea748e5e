//! Device Token Lifecycle Tests
//!
//! Covers register, refresh, and soft-disable, including refreshes racing an
//! opt-out.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use beacon::app::agent::{AgentHandle, BackgroundAgentRegistrar};
use beacon::app::capability::CapabilityProbe;
use beacon::app::error::PushError;
use beacon::app::tokens::{RefreshOutcome, TokenLifecycleManager};
use beacon::domain::token::{Platform, TokenState};
use beacon::infra::memory::MemoryStore;
use beacon::infra::store::TokenStore;
use common::{ios_tab_env, scope, supported_env, FakeProvider, FakeRuntime};

struct Fixture {
    store: MemoryStore,
    provider: Arc<FakeProvider>,
    manager: Arc<TokenLifecycleManager>,
    agent: AgentHandle,
}

async fn fixture(provider: Arc<FakeProvider>) -> Fixture {
    let store = MemoryStore::new();
    let manager = Arc::new(TokenLifecycleManager::new(
        Arc::new(store.clone()),
        provider.clone(),
    ));
    let registrar = BackgroundAgentRegistrar::new(
        FakeRuntime::new(Duration::from_millis(1)),
        scope(),
        Duration::from_secs(1),
    );
    let agent = registrar.ensure_active_agent().await.unwrap();
    Fixture {
        store,
        provider,
        manager,
        agent,
    }
}

#[tokio::test]
async fn register_stores_an_enabled_token() {
    let fx = fixture(FakeProvider::new()).await;
    let recipient_id = Uuid::new_v4();
    let snapshot = CapabilityProbe::probe(&supported_env());

    let token = fx
        .manager
        .register(recipient_id, &snapshot, &fx.agent)
        .await
        .unwrap();

    assert_eq!(token.token_value, "token-1");
    assert!(token.enabled);
    assert_eq!(token.platform, Platform::AndroidOrWeb);
    assert_eq!(token.disabled_at, None);
    assert_eq!(fx.store.get(recipient_id).await.unwrap(), Some(token));
    assert_eq!(fx.manager.state(recipient_id).await.unwrap(), TokenState::Active);
}

#[tokio::test]
async fn register_refuses_unsupported_platforms() {
    let fx = fixture(FakeProvider::new()).await;
    let snapshot = CapabilityProbe::probe(&ios_tab_env());

    let err = fx
        .manager
        .register(Uuid::new_v4(), &snapshot, &fx.agent)
        .await
        .unwrap_err();

    assert!(matches!(err, PushError::CapabilityUnsupported { .. }));
    assert_eq!(fx.provider.calls(), 0);
    assert_eq!(fx.store.token_count().await, 0);
}

#[tokio::test]
async fn reregistering_replaces_the_single_record() {
    let fx = fixture(FakeProvider::new()).await;
    let recipient_id = Uuid::new_v4();
    let snapshot = CapabilityProbe::probe(&supported_env());

    fx.manager.register(recipient_id, &snapshot, &fx.agent).await.unwrap();
    fx.manager.disable(recipient_id).await.unwrap();
    let again = fx.manager.register(recipient_id, &snapshot, &fx.agent).await.unwrap();

    assert_eq!(again.token_value, "token-2");
    assert!(again.enabled);
    assert_eq!(again.disabled_at, None);
    assert_eq!(fx.store.token_count().await, 1);
}

#[tokio::test]
async fn provider_failure_stores_nothing() {
    let provider = FakeProvider::new();
    provider.failing.store(true, Ordering::SeqCst);
    let fx = fixture(provider).await;
    let recipient_id = Uuid::new_v4();
    let snapshot = CapabilityProbe::probe(&supported_env());

    let err = fx
        .manager
        .register(recipient_id, &snapshot, &fx.agent)
        .await
        .unwrap_err();

    assert!(matches!(err, PushError::TokenRequestFailed(_)));
    assert!(err.is_retryable());
    assert_eq!(fx.manager.state(recipient_id).await.unwrap(), TokenState::NoToken);
}

#[tokio::test]
async fn refresh_rotates_the_value_and_keeps_enabled() {
    let fx = fixture(FakeProvider::new()).await;
    let recipient_id = Uuid::new_v4();
    let snapshot = CapabilityProbe::probe(&supported_env());
    let original = fx.manager.register(recipient_id, &snapshot, &fx.agent).await.unwrap();

    let outcome = fx.manager.refresh(recipient_id, &fx.agent).await.unwrap();

    let token = match outcome {
        RefreshOutcome::Refreshed(token) => token,
        other => panic!("expected a refreshed token, got {:?}", other),
    };
    assert_eq!(token.token_value, "token-2");
    assert!(token.enabled);
    assert_eq!(token.created_at, original.created_at);
}

#[tokio::test]
async fn refresh_with_same_value_is_unchanged() {
    let provider = FakeProvider::new();
    *provider.fixed.lock().unwrap() = Some("stable".to_string());
    let fx = fixture(provider).await;
    let recipient_id = Uuid::new_v4();
    let snapshot = CapabilityProbe::probe(&supported_env());
    fx.manager.register(recipient_id, &snapshot, &fx.agent).await.unwrap();

    let outcome = fx.manager.refresh(recipient_id, &fx.agent).await.unwrap();
    assert!(matches!(outcome, RefreshOutcome::Unchanged(token) if token.token_value == "stable"));
}

#[tokio::test]
async fn refresh_without_a_record_does_nothing() {
    let fx = fixture(FakeProvider::new()).await;

    let outcome = fx.manager.refresh(Uuid::new_v4(), &fx.agent).await.unwrap();

    assert_eq!(outcome, RefreshOutcome::SkippedNoToken);
    assert_eq!(fx.provider.calls(), 0);
    assert_eq!(fx.store.token_count().await, 0);
}

#[tokio::test]
async fn disable_then_refresh_stays_disabled() {
    let fx = fixture(FakeProvider::new()).await;
    let recipient_id = Uuid::new_v4();
    let snapshot = CapabilityProbe::probe(&supported_env());
    let registered = fx.manager.register(recipient_id, &snapshot, &fx.agent).await.unwrap();

    let disabled = fx.manager.disable(recipient_id).await.unwrap().unwrap();
    assert!(!disabled.enabled);
    assert!(disabled.disabled_at.is_some());
    assert_eq!(disabled.token_value, registered.token_value);

    let outcome = fx.manager.refresh(recipient_id, &fx.agent).await.unwrap();

    assert_eq!(outcome, RefreshOutcome::SkippedDisabled);
    let stored = fx.store.get(recipient_id).await.unwrap().unwrap();
    assert!(!stored.enabled);
    assert_eq!(fx.manager.state(recipient_id).await.unwrap(), TokenState::Disabled);
}

#[tokio::test]
async fn disable_during_in_flight_refresh_wins() {
    let fx = fixture(FakeProvider::with_delay(Duration::from_millis(100))).await;
    let recipient_id = Uuid::new_v4();
    let snapshot = CapabilityProbe::probe(&supported_env());
    fx.manager.register(recipient_id, &snapshot, &fx.agent).await.unwrap();

    let manager = fx.manager.clone();
    let agent = fx.agent.clone();
    let refresh = tokio::spawn(async move { manager.refresh(recipient_id, &agent).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        fx.manager.state(recipient_id).await.unwrap(),
        TokenState::Refreshing
    );
    fx.manager.disable(recipient_id).await.unwrap();

    let outcome = refresh.await.unwrap().unwrap();
    assert_eq!(outcome, RefreshOutcome::SkippedDisabled);

    let stored = fx.store.get(recipient_id).await.unwrap().unwrap();
    assert!(!stored.enabled);
    assert!(stored.disabled_at.is_some());
    assert_eq!(fx.store.token_count().await, 1);
}

#[tokio::test]
async fn disable_without_a_record_is_a_no_op() {
    let fx = fixture(FakeProvider::new()).await;

    assert_eq!(fx.manager.disable(Uuid::new_v4()).await.unwrap(), None);
    assert_eq!(fx.store.token_count().await, 0);
}

#[tokio::test]
async fn interleaved_operations_keep_one_record_per_recipient() {
    let fx = fixture(FakeProvider::with_delay(Duration::from_millis(1))).await;
    let snapshot = CapabilityProbe::probe(&supported_env());
    let recipients: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _round in 0..10 {
        let ops = (0..20).map(|_| {
            let recipient_id = recipients[rng.gen_range(0..recipients.len())];
            let op = rng.gen_range(0..3);
            let manager = fx.manager.clone();
            let agent = fx.agent.clone();
            async move {
                match op {
                    0 => {
                        let _ = manager.register(recipient_id, &snapshot, &agent).await;
                    }
                    1 => {
                        let _ = manager.refresh(recipient_id, &agent).await;
                    }
                    _ => {
                        let _ = manager.disable(recipient_id).await;
                    }
                }
            }
        });
        join_all(ops.collect::<Vec<_>>()).await;
        assert!(fx.store.token_count().await <= recipients.len());
    }

    // Opt everyone out, then let refreshes race each other: nobody comes back.
    join_all(recipients.iter().map(|id| fx.manager.disable(*id))).await;
    join_all(recipients.iter().map(|id| fx.manager.refresh(*id, &fx.agent))).await;

    for id in &recipients {
        if let Some(token) = fx.store.get(*id).await.unwrap() {
            assert!(!token.enabled, "recipient {} re-enabled by refresh", id);
        }
    }
}
