// ABOUTME: Shared test fixtures: mock exchanger, counting adapter, service assembly
// ABOUTME: Builds a fully in-memory SyncService with pinned clock and fast backoff
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use linkvault::config::{OAuthProviderConfig, ProviderRegistry};
use linkvault::errors::{AppError, AppResult};
use linkvault::models::{OAuthTokens, PlaidAccess, Provider};
use linkvault::oauth::flow::{AuthorizationFlowController, TokenExchanger};
use linkvault::providers::{AdapterRegistry, DataAdapter, FetchOptions};
use linkvault::service::{SyncService, SyncServiceDeps};
use linkvault::storage::{InMemoryAuditStore, InMemoryServiceStore, NewConnectedService};
use linkvault::sync::SchedulerConfig;
use linkvault::utils::Clock;
use linkvault::vault::CredentialVault;

/// A clock pinned to a settable instant
pub struct FrozenClock {
    now: Mutex<DateTime<Utc>>,
}

impl FrozenClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut guard = self.now.lock().unwrap();
        *guard += by;
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// TokenExchanger double that counts refreshes and returns a canned token set
pub struct MockExchanger {
    pub refresh_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub refresh_response: Mutex<AppResult<OAuthTokens>>,
    pub exchange_response: Mutex<AppResult<OAuthTokens>>,
    pub user_info: Value,
}

impl MockExchanger {
    pub fn returning(tokens: OAuthTokens) -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refresh_response: Mutex::new(Ok(tokens.clone())),
            exchange_response: Mutex::new(Ok(tokens)),
            user_info: json!({ "id": "provider-user-1" }),
        }
    }

    pub fn with_user_info(mut self, user_info: Value) -> Self {
        self.user_info = user_info;
        self
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

fn clone_result(result: &AppResult<OAuthTokens>) -> AppResult<OAuthTokens> {
    match result {
        Ok(tokens) => Ok(tokens.clone()),
        Err(e) => Err(AppError::internal(format!("mock failure: {e}"))),
    }
}

#[async_trait]
impl TokenExchanger for MockExchanger {
    async fn exchange_code(&self, _provider: Provider, _code: &str) -> AppResult<OAuthTokens> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        clone_result(&self.exchange_response.lock().unwrap())
    }

    async fn refresh_access_token(
        &self,
        _provider: Provider,
        _refresh_token: &str,
    ) -> AppResult<OAuthTokens> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        clone_result(&self.refresh_response.lock().unwrap())
    }

    async fn fetch_user_info(&self, _provider: Provider, _access_token: &str) -> AppResult<Value> {
        Ok(self.user_info.clone())
    }

    async fn exchange_public_token(&self, _public_token: &str) -> AppResult<PlaidAccess> {
        Ok(PlaidAccess {
            access_token: "plaid-access".to_owned(),
            item_id: "item-1".to_owned(),
        })
    }
}

/// DataAdapter double that counts calls and pops scripted outcomes
pub struct CountingAdapter {
    provider: Provider,
    pub calls: AtomicUsize,
    script: Mutex<Vec<AppResult<Value>>>,
    fallback: Value,
}

impl CountingAdapter {
    pub fn succeeding(provider: Provider) -> Self {
        Self {
            provider,
            calls: AtomicUsize::new(0),
            script: Mutex::new(Vec::new()),
            fallback: json!({ "provider": provider.as_str(), "records": 3 }),
        }
    }

    /// Fail every call with a retryable 500-style error
    pub fn always_failing(provider: Provider) -> Self {
        let mut adapter = Self::succeeding(provider);
        adapter.fallback = Value::Null;
        adapter
    }

    /// Queue outcomes consumed in order before the fallback applies
    pub fn push_outcome(&self, outcome: AppResult<Value>) {
        self.script.lock().unwrap().push(outcome);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataAdapter for CountingAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch_normalized_data(
        &self,
        _access_token: &str,
        _options: &FetchOptions,
    ) -> AppResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if !script.is_empty() {
            return script.remove(0);
        }
        drop(script);
        if self.fallback.is_null() {
            return Err(AppError::api(
                self.provider,
                "records",
                Some(500),
                "upstream unavailable",
            ));
        }
        Ok(self.fallback.clone())
    }
}

/// Registry with fake endpoints for every provider
pub fn test_registry() -> ProviderRegistry {
    let mut configs = HashMap::new();
    for provider in Provider::ALL {
        let has_redirect = provider != Provider::Plaid;
        configs.insert(
            provider,
            OAuthProviderConfig {
                client_id: format!("{provider}-client"),
                client_secret: format!("{provider}-secret"),
                redirect_uri: format!("https://app.example/callback/{provider}"),
                authorization_url: has_redirect
                    .then(|| format!("https://auth.example/{provider}/authorize")),
                token_url: Some(format!("https://auth.example/{provider}/token")),
                scope: scope_for(provider),
                user_info_url: (provider != Provider::Plaid)
                    .then(|| format!("https://api.example/{provider}/me")),
            },
        );
    }
    ProviderRegistry::new(configs)
}

pub fn scope_for(provider: Provider) -> Vec<String> {
    match provider {
        Provider::Spotify => vec!["user-read-email".into(), "user-top-read".into()],
        Provider::Fitbit => vec!["activity".into(), "sleep".into(), "profile".into()],
        Provider::Google => vec![
            "https://www.googleapis.com/auth/userinfo.email".into(),
            "https://www.googleapis.com/auth/calendar.readonly".into(),
        ],
        Provider::Plaid => vec!["transactions".into()],
        Provider::Notion => Vec::new(),
    }
}

pub fn tokens_with_refresh(access: &str, refresh: Option<&str>) -> OAuthTokens {
    OAuthTokens {
        access_token: access.to_owned(),
        refresh_token: refresh.map(ToOwned::to_owned),
        expires_in: Some(3600),
        token_type: Some("Bearer".to_owned()),
        scope: Some("scope-a scope-b".to_owned()),
    }
}

/// A fully assembled in-memory service plus handles to its collaborators
pub struct TestHarness {
    pub service: SyncService,
    pub services: Arc<InMemoryServiceStore>,
    pub audit: Arc<InMemoryAuditStore>,
    pub cache: Arc<linkvault::cache::InMemoryCache>,
    pub vault: Arc<CredentialVault>,
    pub exchanger: Arc<MockExchanger>,
    pub adapter: Arc<CountingAdapter>,
    pub clock: Arc<FrozenClock>,
}

pub fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        max_attempts: 3,
        base_backoff: Duration::from_millis(10),
        job_timeout: Duration::from_secs(5),
        max_concurrency: 4,
        ..SchedulerConfig::default()
    }
}

/// Assemble a service around one adapter double and one exchanger double
pub fn harness_with(adapter: CountingAdapter, exchanger: MockExchanger) -> TestHarness {
    let services = Arc::new(InMemoryServiceStore::new());
    let audit = Arc::new(InMemoryAuditStore::new());
    let cache = Arc::new(linkvault::cache::InMemoryCache::new());
    let vault = Arc::new(CredentialVault::from_key([7u8; 32]));
    let clock = Arc::new(FrozenClock::at(Utc::now()));
    let exchanger = Arc::new(exchanger);
    let adapter = Arc::new(adapter);

    let registry = Arc::new(test_registry());
    let flow = Arc::new(AuthorizationFlowController::new(Arc::clone(&registry)).unwrap());

    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::clone(&adapter) as Arc<dyn DataAdapter>);

    let service = SyncService::new(SyncServiceDeps {
        vault: Arc::clone(&vault),
        flow,
        exchanger: Arc::clone(&exchanger) as Arc<dyn TokenExchanger>,
        adapters: Arc::new(adapters),
        services: Arc::clone(&services) as Arc<dyn linkvault::storage::ServiceStore>,
        audit_store: Arc::clone(&audit) as Arc<dyn linkvault::storage::AuditStore>,
        cache_store: Arc::clone(&cache) as Arc<dyn linkvault::cache::CacheStore>,
        clock: Arc::clone(&clock) as Arc<dyn Clock>,
        scheduler_config: fast_scheduler_config(),
    });

    TestHarness {
        service,
        services,
        audit,
        cache,
        vault,
        exchanger,
        adapter,
        clock,
    }
}

/// Insert a connected service directly into the store
pub async fn seed_service(
    harness: &TestHarness,
    user_id: Uuid,
    provider: Provider,
    access_plain: &str,
    refresh_plain: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> linkvault::models::ConnectedService {
    use linkvault::storage::ServiceStore as _;
    harness
        .services
        .upsert(NewConnectedService {
            user_id,
            provider,
            provider_user_id: "provider-user-1".to_owned(),
            access_token: harness.vault.encrypt(access_plain).unwrap(),
            refresh_token: refresh_plain.map(|t| harness.vault.encrypt(t).unwrap()),
            token_expires_at: expires_at,
            scope: Some("scope-a".to_owned()),
            metadata: json!({ "id": "provider-user-1" }),
        })
        .await
        .unwrap()
}

/// Poll until the job leaves the queue's live states or the deadline passes
pub async fn wait_for_job(
    scheduler: &linkvault::sync::SyncScheduler,
    job_id: Uuid,
) -> linkvault::sync::JobStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = scheduler.job_status(job_id) {
            if matches!(
                status,
                linkvault::sync::JobStatus::Completed | linkvault::sync::JobStatus::Failed
            ) {
                return status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
