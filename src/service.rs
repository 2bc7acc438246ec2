// ABOUTME: SyncService facade: the upward contract consumed by the route layer
// ABOUTME: initiate_auth, handle_callback, get_data, trigger_sync, disconnect, stats
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Service Facade
//!
//! Wires the vault, flow controller, refresh manager, adapters, stores,
//! cache, audit trail, and scheduler together behind the operations the
//! route layer consumes. Every dependency arrives by constructor injection;
//! nothing here is a global.

use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::cache::{CacheKey, CacheLayer, CacheStore, InMemoryCache};
use crate::config::ProviderRegistry;
use crate::errors::{AppError, AppResult};
use crate::models::{AuditAction, ConnectedServiceSummary, Provider};
use crate::oauth::flow::{AuthorizationFlowController, TokenExchanger};
use crate::oauth::refresh::TokenRefreshManager;
use crate::providers::{AdapterRegistry, FetchOptions};
use crate::storage::{
    AuditStore, InMemoryAuditStore, InMemoryServiceStore, NewConnectedService, ServiceStore,
};
use crate::sync::{PairLocks, QueueStats, SchedulerConfig, SyncScheduler, SyncWorker};
use crate::utils::{generate_state_token, Clock, SystemClock};
use crate::vault::CredentialVault;

/// Environment variable carrying the vault secret
const VAULT_SECRET_VAR: &str = "LINKVAULT_VAULT_SECRET";

/// Everything the route layer needs to start an OAuth flow. Binding the
/// state token to the initiating user in an expiring store is the route
/// layer's responsibility.
#[derive(Debug, Clone)]
pub struct AuthInitiation {
    /// URL to redirect the user's browser to
    pub authorization_url: String,
    /// Opaque CSRF state embedded in the URL
    pub state: String,
}

/// A normalized payload plus where it came from
#[derive(Debug, Clone)]
pub struct DataEnvelope {
    /// Provider the payload describes
    pub provider: Provider,
    /// Normalized payload
    pub data: Value,
    /// Whether the payload was served from cache
    pub cached: bool,
}

/// The credential lifecycle manager and sync engine, assembled
pub struct SyncService {
    vault: Arc<CredentialVault>,
    flow: Arc<AuthorizationFlowController>,
    exchanger: Arc<dyn TokenExchanger>,
    adapters: Arc<AdapterRegistry>,
    services: Arc<dyn ServiceStore>,
    audit: Arc<AuditTrail>,
    cache: Arc<CacheLayer>,
    refresh: Arc<TokenRefreshManager>,
    scheduler: SyncScheduler,
    locks: Arc<PairLocks>,
    clock: Arc<dyn Clock>,
}

/// Collaborators injected into [`SyncService::new`]
pub struct SyncServiceDeps {
    /// Credential vault
    pub vault: Arc<CredentialVault>,
    /// Authorization URL builder over the provider registry
    pub flow: Arc<AuthorizationFlowController>,
    /// Token endpoint client (or a test double)
    pub exchanger: Arc<dyn TokenExchanger>,
    /// Adapter set
    pub adapters: Arc<AdapterRegistry>,
    /// Row store for connected services
    pub services: Arc<dyn ServiceStore>,
    /// Append-only audit store
    pub audit_store: Arc<dyn AuditStore>,
    /// Cache backend
    pub cache_store: Arc<dyn CacheStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Queue tuning
    pub scheduler_config: SchedulerConfig,
}

impl SyncService {
    /// Assemble the service from injected collaborators
    #[must_use]
    pub fn new(deps: SyncServiceDeps) -> Self {
        let audit = Arc::new(AuditTrail::new(deps.audit_store));
        let cache = Arc::new(CacheLayer::new(deps.cache_store, CacheLayer::DEFAULT_TTL));
        let locks = Arc::new(PairLocks::new());

        let refresh = Arc::new(TokenRefreshManager::new(
            Arc::clone(&deps.vault),
            Arc::clone(&deps.exchanger),
            Arc::clone(&deps.services),
            Arc::clone(&audit),
            Arc::clone(&deps.clock),
        ));

        let worker = SyncWorker::new(
            Arc::clone(&deps.services),
            Arc::clone(&refresh),
            Arc::clone(&deps.adapters),
            Arc::clone(&cache),
            Arc::clone(&audit),
            Arc::clone(&locks),
            Arc::clone(&deps.clock),
        );
        let scheduler = SyncScheduler::new(
            worker,
            Arc::clone(&audit),
            Arc::clone(&deps.clock),
            deps.scheduler_config,
        );

        Self {
            vault: deps.vault,
            flow: deps.flow,
            exchanger: deps.exchanger,
            adapters: deps.adapters,
            services: deps.services,
            audit,
            cache,
            refresh,
            scheduler,
            locks,
            clock: deps.clock,
        }
    }

    /// Assemble a production service from the environment: provider
    /// registry, vault secret, HTTP flow controller, default adapters, and
    /// in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the vault secret or any enabled
    /// provider's credentials are missing.
    pub fn from_env() -> AppResult<Self> {
        let registry = Arc::new(ProviderRegistry::from_env()?);
        let secret = env::var(VAULT_SECRET_VAR).map_err(|_| {
            AppError::configuration(format!("{VAULT_SECRET_VAR} is not set"))
        })?;

        let vault = Arc::new(CredentialVault::new(&secret)?);
        let flow = Arc::new(AuthorizationFlowController::new(Arc::clone(&registry))?);
        let adapters = Arc::new(AdapterRegistry::with_defaults(&registry)?);

        Ok(Self::new(SyncServiceDeps {
            vault,
            flow: Arc::clone(&flow),
            exchanger: flow,
            adapters,
            services: Arc::new(InMemoryServiceStore::new()),
            audit_store: Arc::new(InMemoryAuditStore::new()),
            cache_store: Arc::new(InMemoryCache::new()),
            clock: Arc::new(SystemClock),
            scheduler_config: SchedulerConfig::default(),
        }))
    }

    /// Start an OAuth flow: generate a CSRF state and build the redirect
    /// URL. The flow controller, not this method, knows per-provider
    /// quirks.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unconfigured providers or
    /// providers without a redirect flow (Plaid).
    pub fn initiate_auth(&self, provider: Provider) -> AppResult<AuthInitiation> {
        let state = generate_state_token();
        let authorization_url = self.flow.build_authorization_url(provider, &state)?;
        Ok(AuthInitiation {
            authorization_url,
            state,
        })
    }

    /// Complete an OAuth callback: exchange the code, fetch user info,
    /// encrypt both tokens with independent IVs, and upsert the service
    /// row (reactivating a previously disconnected link).
    ///
    /// The route layer must have verified the CSRF state before calling.
    ///
    /// # Errors
    ///
    /// Propagates exchange and user-info errors; Plaid must connect
    /// through [`Self::connect_plaid`].
    pub async fn handle_callback(
        &self,
        user_id: Uuid,
        provider: Provider,
        code: &str,
    ) -> AppResult<ConnectedServiceSummary> {
        if provider == Provider::Plaid {
            return Err(AppError::configuration(
                "plaid connects via the public-token exchange, not an OAuth callback",
            ));
        }

        let tokens = self.exchanger.exchange_code(provider, code).await?;
        let user_info = self
            .exchanger
            .fetch_user_info(provider, &tokens.access_token)
            .await?;
        let provider_user_id = provider_user_id_from(provider, &user_info);

        let access_token = self.vault.encrypt(&tokens.access_token)?;
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.vault.encrypt(t))
            .transpose()?;
        let token_expires_at = tokens
            .expires_in
            .map(|seconds| self.clock.now() + chrono::Duration::seconds(seconds as i64));

        let service = self
            .services
            .upsert(NewConnectedService {
                user_id,
                provider,
                provider_user_id,
                access_token,
                refresh_token,
                token_expires_at,
                scope: tokens.scope,
                metadata: user_info,
            })
            .await?;

        self.audit
            .record(
                AuditAction::ServiceConnected,
                service.audit_resource(),
                user_id,
                json!({ "provider": provider.as_str() }),
            )
            .await;

        info!(
            target: "linkvault::oauth",
            provider = %provider,
            user_id = %user_id,
            "service connected"
        );

        Ok(ConnectedServiceSummary::from(&service))
    }

    /// Complete a Plaid Link connect: swap the public token for a
    /// long-lived access token and upsert the service. Plaid tokens carry
    /// no expiry and no refresh token.
    ///
    /// # Errors
    ///
    /// Propagates the exchange error.
    pub async fn connect_plaid(
        &self,
        user_id: Uuid,
        public_token: &str,
    ) -> AppResult<ConnectedServiceSummary> {
        let access = self.exchanger.exchange_public_token(public_token).await?;

        let service = self
            .services
            .upsert(NewConnectedService {
                user_id,
                provider: Provider::Plaid,
                provider_user_id: access.item_id.clone(),
                access_token: self.vault.encrypt(&access.access_token)?,
                refresh_token: None,
                token_expires_at: None,
                scope: None,
                metadata: json!({ "item_id": access.item_id }),
            })
            .await?;

        self.audit
            .record(
                AuditAction::ServiceConnected,
                service.audit_resource(),
                user_id,
                json!({ "provider": Provider::Plaid.as_str() }),
            )
            .await;

        Ok(ConnectedServiceSummary::from(&service))
    }

    /// Read-through fetch of a user's normalized data for one provider.
    /// Cache hits never touch the adapter.
    ///
    /// # Errors
    ///
    /// Returns an auth error if the service is not connected; otherwise
    /// propagates refresh and adapter failures.
    pub async fn get_data(
        &self,
        user_id: Uuid,
        provider: Provider,
        window_days: u32,
    ) -> AppResult<DataEnvelope> {
        let service = self
            .services
            .find_by_user_and_provider(user_id, provider)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::auth(format!("{provider} is not connected")))?;

        let key = CacheKey {
            user_id,
            provider,
            window_days,
        };
        if let Some(data) = self.cache.lookup(&key).await {
            return Ok(DataEnvelope {
                provider,
                data,
                cached: true,
            });
        }

        let _pair_guard = self.locks.acquire(user_id, provider).await;

        let valid = self.refresh.valid_access_token(&service).await?;
        let adapter = self.adapters.get(provider)?;
        let data = adapter
            .fetch_normalized_data(&valid.access_token, &FetchOptions { window_days })
            .await?;

        self.services
            .touch_last_sync(service.id, self.clock.now())
            .await?;
        self.cache.store(&key, &data).await?;

        Ok(DataEnvelope {
            provider,
            data,
            cached: false,
        })
    }

    /// Return a currently valid plaintext access token for the pair,
    /// refreshing transparently if needed.
    ///
    /// # Errors
    ///
    /// Returns an auth error if the service is not connected or cannot be
    /// refreshed.
    pub async fn get_valid_access_token(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> AppResult<String> {
        let service = self
            .services
            .find_by_user_and_provider(user_id, provider)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::auth(format!("{provider} is not connected")))?;

        let _pair_guard = self.locks.acquire(user_id, provider).await;
        Ok(self.refresh.valid_access_token(&service).await?.access_token)
    }

    /// Enqueue a one-off sync for a connected provider.
    ///
    /// # Errors
    ///
    /// Returns an auth error if the service is not connected.
    pub async fn trigger_sync(&self, user_id: Uuid, provider: Provider) -> AppResult<Uuid> {
        let service = self
            .services
            .find_by_user_and_provider(user_id, provider)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::auth(format!("{provider} is not connected")))?;

        Ok(self.scheduler.schedule_sync(user_id, provider, service.id))
    }

    /// Enqueue one-off syncs for every active service of the user
    ///
    /// # Errors
    ///
    /// Propagates row-store failures.
    pub async fn trigger_all_sync(&self, user_id: Uuid) -> AppResult<Vec<(Provider, Uuid)>> {
        let services = self.services.list_active_for_user(user_id).await?;
        Ok(services
            .into_iter()
            .map(|service| {
                let job_id =
                    self.scheduler
                        .schedule_sync(user_id, service.provider, service.id);
                (service.provider, job_id)
            })
            .collect())
    }

    /// Register a recurring sync for a connected provider. Idempotent per
    /// (user, provider); returns whether a new schedule was created.
    ///
    /// # Errors
    ///
    /// Returns an auth error if the service is not connected.
    pub async fn schedule_recurring_sync(
        &self,
        user_id: Uuid,
        provider: Provider,
        interval_hours: u64,
    ) -> AppResult<bool> {
        let service = self
            .services
            .find_by_user_and_provider(user_id, provider)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::auth(format!("{provider} is not connected")))?;

        Ok(self
            .scheduler
            .schedule_recurring_sync(user_id, provider, service.id, interval_hours))
    }

    /// Soft-disconnect a provider: deactivate the row, stop any recurring
    /// schedule, drop cached payloads, and record the audit entry. The row
    /// and its audit history remain queryable.
    ///
    /// # Errors
    ///
    /// Returns an auth error if the service was never connected.
    pub async fn disconnect(&self, user_id: Uuid, provider: Provider) -> AppResult<()> {
        let service = self
            .services
            .find_by_user_and_provider(user_id, provider)
            .await?
            .ok_or_else(|| AppError::auth(format!("{provider} is not connected")))?;

        self.services.mark_inactive(service.id).await?;
        self.scheduler.cancel_recurring_sync(user_id, provider);
        self.cache.invalidate(user_id, provider).await;

        self.audit
            .record(
                AuditAction::ServiceDisconnected,
                service.audit_resource(),
                user_id,
                json!({ "provider": provider.as_str() }),
            )
            .await;

        info!(
            target: "linkvault::oauth",
            provider = %provider,
            user_id = %user_id,
            "service disconnected"
        );

        Ok(())
    }

    /// All active services for a user, with token material redacted
    ///
    /// # Errors
    ///
    /// Propagates row-store failures.
    pub async fn connected_services(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<ConnectedServiceSummary>> {
        let services = self.services.list_active_for_user(user_id).await?;
        Ok(services.iter().map(ConnectedServiceSummary::from).collect())
    }

    /// Queue occupancy snapshot
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.scheduler.stats()
    }

    /// Access the scheduler for maintenance (pruning, shutdown)
    #[must_use]
    pub const fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }
}

/// Where each provider's user id lives in its user-info document
fn provider_user_id_from(provider: Provider, user_info: &Value) -> String {
    let pointer = match provider {
        Provider::Fitbit => "/user/encodedId",
        Provider::Notion => "/bot/owner/user/id",
        Provider::Spotify | Provider::Google | Provider::Plaid => "/id",
    };
    user_info
        .pointer(pointer)
        .or_else(|| user_info.pointer("/id"))
        .and_then(Value::as_str)
        .map_or_else(|| "unknown".to_owned(), ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitbit_user_id_comes_from_the_profile_envelope() {
        let info = json!({ "user": { "encodedId": "ABC123" } });
        assert_eq!(provider_user_id_from(Provider::Fitbit, &info), "ABC123");
    }

    #[test]
    fn notion_falls_back_to_the_top_level_id() {
        let info = json!({ "id": "bot-id" });
        assert_eq!(provider_user_id_from(Provider::Notion, &info), "bot-id");
    }

    #[test]
    fn missing_ids_map_to_unknown() {
        assert_eq!(
            provider_user_id_from(Provider::Spotify, &json!({})),
            "unknown"
        );
    }
}
