// ABOUTME: Transparent token refresh: staleness check, re-encryption, CAS persist, audit
// ABOUTME: TokenRefreshManager turns a ConnectedService row into a usable access token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use chrono::Duration as ChronoDuration;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::AuditTrail;
use crate::errors::{AppError, AppResult};
use crate::models::{AuditAction, ConnectedService};
use crate::oauth::flow::TokenExchanger;
use crate::storage::{ServiceStore, TokenUpdate};
use crate::utils::Clock;
use crate::vault::CredentialVault;

/// A decrypted, currently valid access token plus the row state it came
/// from (refreshed in place when a refresh occurred)
pub struct ValidToken {
    /// Plaintext access token, ready for a bearer header
    pub access_token: String,
    /// The service row, reflecting any refresh that was persisted
    pub service: ConnectedService,
}

/// Decides when a stored token is stale and performs the refresh,
/// re-encrypting and persisting the result before handing the token out.
pub struct TokenRefreshManager {
    vault: Arc<CredentialVault>,
    exchanger: Arc<dyn TokenExchanger>,
    services: Arc<dyn ServiceStore>,
    audit: Arc<AuditTrail>,
    clock: Arc<dyn Clock>,
}

impl TokenRefreshManager {
    /// Wire up the manager with its collaborators
    #[must_use]
    pub fn new(
        vault: Arc<CredentialVault>,
        exchanger: Arc<dyn TokenExchanger>,
        services: Arc<dyn ServiceStore>,
        audit: Arc<AuditTrail>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            vault,
            exchanger,
            services,
            audit,
            clock,
        }
    }

    /// Return a valid access token for the service, refreshing first if the
    /// stored token has expired.
    ///
    /// On refresh, the access token, refresh token (kept from before when
    /// the provider omits a new one), expiry, and both IV/tag pairs are
    /// rewritten together under an optimistic-concurrency check, and an
    /// `oauth_refresh` audit entry is recorded.
    ///
    /// # Errors
    ///
    /// Returns an auth error when the token is expired and no refresh token
    /// exists (the caller must prompt re-authorization), a decryption error
    /// for tampered token material, or the refresh grant's exchange error.
    pub async fn valid_access_token(&self, service: &ConnectedService) -> AppResult<ValidToken> {
        let access_token = self.vault.decrypt(&service.access_token)?;

        if !service.is_token_expired(self.clock.now()) {
            debug!(
                target: "linkvault::oauth",
                provider = %service.provider,
                service_id = %service.id,
                "stored access token still valid"
            );
            return Ok(ValidToken {
                access_token,
                service: service.clone(),
            });
        }

        let Some(encrypted_refresh) = service.refresh_token.as_ref() else {
            return Err(AppError::auth(format!(
                "{} token expired and no refresh token is stored; re-authorization required",
                service.provider
            )));
        };
        let previous_refresh = self.vault.decrypt(encrypted_refresh)?;

        info!(
            target: "linkvault::oauth",
            provider = %service.provider,
            service_id = %service.id,
            "refreshing expired access token"
        );

        let refreshed = self
            .exchanger
            .refresh_access_token(service.provider, &previous_refresh)
            .await?;

        // Some providers rotate the refresh token, some return none; keep
        // the previous one in the latter case.
        let next_refresh = refreshed
            .refresh_token
            .clone()
            .unwrap_or(previous_refresh);

        let update = TokenUpdate {
            access_token: self.vault.encrypt(&refreshed.access_token)?,
            refresh_token: Some(self.vault.encrypt(&next_refresh)?),
            token_expires_at: refreshed
                .expires_in
                .map(|seconds| self.clock.now() + ChronoDuration::seconds(seconds as i64)),
        };

        let persisted = match self
            .services
            .update_tokens(service.id, service.updated_at, &update)
            .await
        {
            Ok(row) => row,
            Err(AppError::Conflict(_)) => return self.adopt_concurrent_refresh(service).await,
            Err(e) => return Err(e),
        };

        self.audit
            .record(
                AuditAction::OauthRefresh,
                persisted.audit_resource(),
                persisted.user_id,
                json!({ "provider": persisted.provider.as_str() }),
            )
            .await;

        Ok(ValidToken {
            access_token: refreshed.access_token,
            service: persisted,
        })
    }

    /// Another writer refreshed this row between our read and our CAS
    /// update. Adopt its tokens if they are current; otherwise surface a
    /// retryable failure so the job backs off and re-reads.
    async fn adopt_concurrent_refresh(
        &self,
        service: &ConnectedService,
    ) -> AppResult<ValidToken> {
        let Some(current) = self.services.find_by_id(service.id).await? else {
            return Err(AppError::terminal(format!(
                "service {} disappeared during refresh",
                service.id
            )));
        };

        if current.is_token_expired(self.clock.now()) {
            return Err(AppError::retryable(format!(
                "lost a concurrent token refresh race for service {} and the row is still stale",
                service.id
            )));
        }

        debug!(
            target: "linkvault::oauth",
            service_id = %service.id,
            "adopting token refreshed by a concurrent writer"
        );
        let access_token = self.vault.decrypt(&current.access_token)?;
        Ok(ValidToken {
            access_token,
            service: current,
        })
    }
}
