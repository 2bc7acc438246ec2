// ABOUTME: The body of one sync job: load row, refresh token, fetch, cache, stamp, audit
// ABOUTME: Classifies missing/inactive services as terminal before any provider call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::audit::AuditTrail;
use crate::cache::{CacheKey, CacheLayer};
use crate::errors::{AppError, AppResult};
use crate::models::AuditAction;
use crate::oauth::refresh::TokenRefreshManager;
use crate::providers::{AdapterRegistry, FetchOptions};
use crate::storage::ServiceStore;
use crate::sync::{PairLocks, SyncJob};
use crate::utils::Clock;

/// Executes sync jobs. Stateless across jobs; all state flows through the
/// stores and the cache.
pub struct SyncWorker {
    services: Arc<dyn ServiceStore>,
    refresh: Arc<TokenRefreshManager>,
    adapters: Arc<AdapterRegistry>,
    cache: Arc<CacheLayer>,
    audit: Arc<AuditTrail>,
    locks: Arc<PairLocks>,
    clock: Arc<dyn Clock>,
}

impl SyncWorker {
    /// Wire up the worker with its collaborators
    #[must_use]
    pub fn new(
        services: Arc<dyn ServiceStore>,
        refresh: Arc<TokenRefreshManager>,
        adapters: Arc<AdapterRegistry>,
        cache: Arc<CacheLayer>,
        audit: Arc<AuditTrail>,
        locks: Arc<PairLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            services,
            refresh,
            adapters,
            cache,
            audit,
            locks,
            clock,
        }
    }

    /// Run one job to completion.
    ///
    /// Sequence: load row → validate active → acquire the pair lock →
    /// refresh-if-stale → adapter fetch → cache write → `last_sync_at` →
    /// `data_sync` success audit. The caller owns failure auditing and
    /// retry classification.
    ///
    /// # Errors
    ///
    /// Terminal errors for missing or inactive services; otherwise whatever
    /// the refresh, adapter, cache, or store propagates.
    pub async fn process(&self, job: &SyncJob) -> AppResult<()> {
        let service = self
            .services
            .find_by_id(job.service_id)
            .await?
            .ok_or_else(|| {
                AppError::terminal(format!("service {} does not exist", job.service_id))
            })?;

        if !service.is_active {
            return Err(AppError::terminal(format!(
                "service {} for {} is disconnected",
                service.id, service.provider
            )));
        }

        // Serializes with any concurrent refresh or interactive fetch for
        // the same (user, provider) pair.
        let _pair_guard = self.locks.acquire(job.user_id, job.provider).await;

        let valid = self.refresh.valid_access_token(&service).await?;

        let options = FetchOptions::default();
        let adapter = self.adapters.get(job.provider)?;
        let data = adapter
            .fetch_normalized_data(&valid.access_token, &options)
            .await?;

        let key = CacheKey {
            user_id: job.user_id,
            provider: job.provider,
            window_days: options.window_days,
        };
        self.cache.store(&key, &data).await?;

        let now = self.clock.now();
        self.services.touch_last_sync(service.id, now).await?;

        self.audit
            .record(
                AuditAction::DataSync,
                valid.service.audit_resource(),
                job.user_id,
                json!({
                    "provider": job.provider.as_str(),
                    "success": true,
                }),
            )
            .await;

        info!(
            target: "linkvault::sync",
            provider = %job.provider,
            user_id = %job.user_id,
            attempt = job.attempt,
            "sync completed"
        );

        Ok(())
    }
}
