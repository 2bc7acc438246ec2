// ABOUTME: Wire-level OAuth operations: authorize URLs, code exchange, refresh, user info
// ABOUTME: AuthorizationFlowController implements the TokenExchanger seam over reqwest
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ProviderRegistry;
use crate::errors::{AppError, AppResult};
use crate::models::{OAuthTokens, PlaidAccess, Provider};

/// Timeout applied to every token-endpoint request
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream error bodies are truncated to this length in error messages
const ERROR_BODY_LIMIT: usize = 300;

/// Token-endpoint operations consumed by the refresh manager and the
/// service facade. Implemented over HTTP by [`AuthorizationFlowController`]
/// and by in-memory doubles in tests.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange an authorization code for a token set
    async fn exchange_code(&self, provider: Provider, code: &str) -> AppResult<OAuthTokens>;

    /// Mint a new access token from a refresh token. The response carries
    /// whichever refresh token the provider returned; keeping the previous
    /// one when absent is the caller's responsibility.
    async fn refresh_access_token(
        &self,
        provider: Provider,
        refresh_token: &str,
    ) -> AppResult<OAuthTokens>;

    /// Fetch the provider's user-info document with a bearer token
    async fn fetch_user_info(&self, provider: Provider, access_token: &str) -> AppResult<Value>;

    /// Plaid Link flow: swap a public token for a long-lived access token
    async fn exchange_public_token(&self, public_token: &str) -> AppResult<PlaidAccess>;
}

/// Standard token-endpoint response shape
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    scope: Option<String>,
}

impl From<TokenResponse> for OAuthTokens {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            token_type: response.token_type,
            scope: response.scope,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlaidExchangeResponse {
    access_token: String,
    item_id: String,
}

/// Drives the OAuth authorization-code protocol against provider endpoints
pub struct AuthorizationFlowController {
    registry: Arc<ProviderRegistry>,
    http: Client,
}

impl AuthorizationFlowController {
    /// Build a controller over the given registry.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be constructed.
    pub fn new(registry: Arc<ProviderRegistry>) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { registry, http })
    }

    /// Build the authorization redirect URL for a provider.
    ///
    /// Appends `client_id`, `redirect_uri`, `response_type=code`, the opaque
    /// `state`, and the configured scopes (space joined, omitted when the
    /// provider grants workspace-level access without scopes). Google
    /// additionally requests an offline, re-consented grant so a refresh
    /// token is always issued.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unconfigured providers or for
    /// providers without a redirect flow (Plaid).
    pub fn build_authorization_url(&self, provider: Provider, state: &str) -> AppResult<String> {
        let config = self.registry.get(provider)?;
        let base = config.authorization_url.as_deref().ok_or_else(|| {
            AppError::configuration(format!(
                "provider {provider} does not use an authorization redirect"
            ))
        })?;

        let mut url = Url::parse(base).map_err(|e| {
            AppError::configuration(format!("invalid authorization URL for {provider}: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &config.client_id);
            query.append_pair("redirect_uri", &config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("state", state);
            if !config.scope.is_empty() {
                query.append_pair("scope", &config.scope.join(" "));
            }
            if provider == Provider::Google {
                query.append_pair("access_type", "offline");
                query.append_pair("prompt", "consent");
            }
        }

        Ok(url.into())
    }

    async fn token_grant(
        &self,
        provider: Provider,
        params: &[(&str, &str)],
    ) -> AppResult<OAuthTokens> {
        if provider == Provider::Plaid {
            return Err(AppError::configuration(
                "plaid uses the public-token exchange, not an authorization grant",
            ));
        }

        let config = self.registry.get(provider)?;
        let token_url = config.token_url.as_deref().ok_or_else(|| {
            AppError::configuration(format!("provider {provider} has no token endpoint"))
        })?;

        let response = self
            .http
            .post(token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::exchange(provider, None, format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::exchange(
                provider,
                Some(status.as_u16()),
                truncate(&body),
            ));
        }

        let tokens: TokenResponse = response.json().await.map_err(|e| {
            AppError::exchange(provider, None, format!("malformed token response: {e}"))
        })?;

        debug!(
            target: "linkvault::oauth",
            provider = %provider,
            has_refresh = tokens.refresh_token.is_some(),
            "token grant succeeded"
        );

        Ok(tokens.into())
    }
}

#[async_trait]
impl TokenExchanger for AuthorizationFlowController {
    async fn exchange_code(&self, provider: Provider, code: &str) -> AppResult<OAuthTokens> {
        let config = self.registry.get(provider)?;
        let redirect_uri = config.redirect_uri.clone();
        let client_id = config.client_id.clone();
        let client_secret = config.client_secret.clone();
        self.token_grant(
            provider,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &redirect_uri),
                ("client_id", &client_id),
                ("client_secret", &client_secret),
            ],
        )
        .await
    }

    async fn refresh_access_token(
        &self,
        provider: Provider,
        refresh_token: &str,
    ) -> AppResult<OAuthTokens> {
        let config = self.registry.get(provider)?;
        let client_id = config.client_id.clone();
        let client_secret = config.client_secret.clone();
        self.token_grant(
            provider,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &client_id),
                ("client_secret", &client_secret),
            ],
        )
        .await
    }

    async fn fetch_user_info(&self, provider: Provider, access_token: &str) -> AppResult<Value> {
        let config = self.registry.get(provider)?;
        let user_info_url = config.user_info_url.as_deref().ok_or_else(|| {
            AppError::exchange(provider, None, "no user info endpoint configured")
        })?;

        let mut request = self.http.get(user_info_url).bearer_auth(access_token);
        if provider == Provider::Notion {
            request = request.header("Notion-Version", crate::providers::notion::API_VERSION);
        }

        let response = request.send().await.map_err(|e| {
            AppError::exchange(provider, None, format!("user info request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::exchange(
                provider,
                Some(status.as_u16()),
                truncate(&body),
            ));
        }

        response.json().await.map_err(|e| {
            AppError::exchange(provider, None, format!("malformed user info response: {e}"))
        })
    }

    async fn exchange_public_token(&self, public_token: &str) -> AppResult<PlaidAccess> {
        let config = self.registry.get(Provider::Plaid)?;
        let token_url = config.token_url.as_deref().ok_or_else(|| {
            AppError::configuration("plaid public-token exchange endpoint is not configured")
        })?;

        let response = self
            .http
            .post(token_url)
            .json(&serde_json::json!({
                "client_id": config.client_id,
                "secret": config.client_secret,
                "public_token": public_token,
            }))
            .send()
            .await
            .map_err(|e| {
                AppError::exchange(Provider::Plaid, None, format!("exchange request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::exchange(
                Provider::Plaid,
                Some(status.as_u16()),
                truncate(&body),
            ));
        }

        let exchange: PlaidExchangeResponse = response.json().await.map_err(|e| {
            AppError::exchange(
                Provider::Plaid,
                None,
                format!("malformed exchange response: {e}"),
            )
        })?;

        Ok(PlaidAccess {
            access_token: exchange.access_token,
            item_id: exchange.item_id,
        })
    }
}

/// Clip an upstream error body for inclusion in an error message
pub(crate) fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_BODY_LIMIT {
        trimmed.to_owned()
    } else {
        let mut end = ERROR_BODY_LIMIT;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}
