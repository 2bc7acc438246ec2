// ABOUTME: DataAdapter capability trait, AdapterRegistry factory, and shared HTTP helpers
// ABOUTME: All adapter sub-fetches funnel through get_json/post_json for uniform errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProviderRegistry;
use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::oauth::flow::truncate;

/// Timeout applied to every provider data API request
const ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for one normalized fetch
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// How many days of history to fetch
    pub window_days: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

impl FetchOptions {
    /// Window bounds as `YYYY-MM-DD` date strings (start, end)
    #[must_use]
    pub fn date_range(&self) -> (String, String) {
        let end = Utc::now();
        let start = end - ChronoDuration::days(i64::from(self.window_days));
        (
            start.format("%Y-%m-%d").to_string(),
            end.format("%Y-%m-%d").to_string(),
        )
    }

    /// Window bounds as RFC 3339 timestamps (start, end)
    #[must_use]
    pub fn rfc3339_range(&self) -> (String, String) {
        let end = Utc::now();
        let start = end - ChronoDuration::days(i64::from(self.window_days));
        (start.to_rfc3339(), end.to_rfc3339())
    }
}

/// Uniform capability contract implemented by every provider adapter
#[async_trait]
pub trait DataAdapter: Send + Sync {
    /// Which provider this adapter serves
    fn provider(&self) -> Provider;

    /// Fetch and normalize the user's data for the given window.
    ///
    /// # Errors
    ///
    /// Propagates a typed error naming the sub-fetch that failed; partial
    /// aggregation is allowed only where an adapter explicitly tolerates it.
    async fn fetch_normalized_data(
        &self,
        access_token: &str,
        options: &FetchOptions,
    ) -> AppResult<Value>;
}

/// Registry of adapters keyed by provider id; the only dispatch point
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn DataAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry (tests register doubles into it)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the production adapter set for every provider enabled in the
    /// given configuration registry.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed or Plaid is
    /// enabled without credentials.
    pub fn with_defaults(registry: &ProviderRegistry) -> AppResult<Self> {
        let mut adapters = Self::new();
        for provider in registry.providers() {
            let adapter: Arc<dyn DataAdapter> = match provider {
                Provider::Spotify => Arc::new(crate::providers::SpotifyAdapter::new()?),
                Provider::Fitbit => Arc::new(crate::providers::FitbitAdapter::new()?),
                Provider::Google => Arc::new(crate::providers::GoogleCalendarAdapter::new()?),
                Provider::Plaid => {
                    let config = registry.get(Provider::Plaid)?;
                    Arc::new(crate::providers::PlaidAdapter::new(
                        registry.plaid_base_url(),
                        &config.client_id,
                        &config.client_secret,
                    )?)
                }
                Provider::Notion => Arc::new(crate::providers::NotionAdapter::new()?),
            };
            adapters.register(adapter);
        }
        Ok(adapters)
    }

    /// Register (or replace) the adapter for its provider
    pub fn register(&mut self, adapter: Arc<dyn DataAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// Look up the adapter for a provider.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no adapter is registered.
    pub fn get(&self, provider: Provider) -> AppResult<Arc<dyn DataAdapter>> {
        self.adapters.get(&provider).cloned().ok_or_else(|| {
            AppError::configuration(format!("no adapter registered for provider {provider}"))
        })
    }
}

/// Build the shared HTTP client used by an adapter
pub(crate) fn adapter_client() -> AppResult<Client> {
    Client::builder()
        .timeout(ADAPTER_TIMEOUT)
        .build()
        .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))
}

/// Authenticated GET returning deserialized JSON, with uniform error mapping
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    provider: Provider,
    endpoint: &'static str,
    url: &str,
    access_token: &str,
    query: &[(&str, String)],
    headers: &[(&'static str, &'static str)],
) -> AppResult<T> {
    let mut request = client.get(url).bearer_auth(access_token).query(query);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| AppError::api(provider, endpoint, None, e.to_string()))?;

    decode_response(provider, endpoint, response).await
}

/// POST with a JSON body returning deserialized JSON
pub(crate) async fn post_json<T: DeserializeOwned>(
    client: &Client,
    provider: Provider,
    endpoint: &'static str,
    url: &str,
    access_token: Option<&str>,
    body: &Value,
    headers: &[(&'static str, &'static str)],
) -> AppResult<T> {
    let mut request = client.post(url).json(body);
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| AppError::api(provider, endpoint, None, e.to_string()))?;

    decode_response(provider, endpoint, response).await
}

async fn decode_response<T: DeserializeOwned>(
    provider: Provider,
    endpoint: &'static str,
    response: reqwest::Response,
) -> AppResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::api(
            provider,
            endpoint,
            Some(status.as_u16()),
            truncate(&body),
        ));
    }

    response.json::<T>().await.map_err(|e| {
        AppError::api(provider, endpoint, None, format!("malformed response: {e}"))
    })
}

/// Round to one decimal place (summary statistics)
#[must_use]
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
