// ABOUTME: Immutable per-provider OAuth configuration built and validated at boot
// ABOUTME: ProviderRegistry maps provider ids to endpoints, scopes, and client credentials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Provider Registry
//!
//! Built once at startup from the environment and injected into every
//! component that needs it. Construction fails fast if a provider is enabled
//! but its client credentials are missing; there is no mutable global state.

use std::collections::HashMap;
use std::env;

use crate::errors::{AppError, AppResult};
use crate::models::Provider;

/// Environment variable listing enabled providers (comma separated).
/// All five are enabled when unset.
const ENABLED_PROVIDERS_VAR: &str = "LINKVAULT_PROVIDERS";

/// Environment variable selecting the Plaid environment
/// (sandbox, development, production)
const PLAID_ENV_VAR: &str = "PLAID_ENV";

/// OAuth configuration for one provider
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Authorization endpoint; `None` for providers without a redirect flow
    pub authorization_url: Option<String>,
    /// Token endpoint. For Plaid this is the public-token exchange endpoint.
    pub token_url: Option<String>,
    /// Scopes requested at authorization
    pub scope: Vec<String>,
    /// User-info endpoint, if the provider exposes one
    pub user_info_url: Option<String>,
}

/// Immutable map from provider id to its OAuth configuration
#[derive(Debug)]
pub struct ProviderRegistry {
    configs: HashMap<Provider, OAuthProviderConfig>,
    plaid_base_url: String,
}

impl ProviderRegistry {
    /// Build the registry from environment variables, failing fast on any
    /// enabled provider with missing credentials.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `LINKVAULT_PROVIDERS` names an
    /// unknown provider, or an enabled provider is missing its client id,
    /// client secret, or redirect URI.
    pub fn from_env() -> AppResult<Self> {
        let enabled = enabled_providers()?;
        let plaid_base_url = plaid_base_url_from_env();

        let mut configs = HashMap::new();
        for provider in enabled {
            configs.insert(provider, provider_config_from_env(provider, &plaid_base_url)?);
        }

        Ok(Self {
            configs,
            plaid_base_url,
        })
    }

    /// Build a registry from explicit configs (used by tests and embedders)
    #[must_use]
    pub fn new(configs: HashMap<Provider, OAuthProviderConfig>) -> Self {
        Self {
            configs,
            plaid_base_url: plaid_base_url_for("sandbox").to_owned(),
        }
    }

    /// Override the Plaid API base URL (test servers, non-sandbox setups)
    #[must_use]
    pub fn with_plaid_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.plaid_base_url = base_url.into();
        self
    }

    /// Look up the configuration for a provider.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider is not enabled.
    pub fn get(&self, provider: Provider) -> AppResult<&OAuthProviderConfig> {
        self.configs.get(&provider).ok_or_else(|| {
            AppError::configuration(format!("provider {provider} is not configured"))
        })
    }

    /// Enabled providers, in no particular order
    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.configs.keys().copied()
    }

    /// Base URL of the Plaid data API for the configured environment
    #[must_use]
    pub fn plaid_base_url(&self) -> &str {
        &self.plaid_base_url
    }
}

fn enabled_providers() -> AppResult<Vec<Provider>> {
    match env::var(ENABLED_PROVIDERS_VAR) {
        Ok(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect(),
        Err(_) => Ok(Provider::ALL.to_vec()),
    }
}

fn plaid_base_url_from_env() -> String {
    let environment = env::var(PLAID_ENV_VAR).unwrap_or_else(|_| "sandbox".to_owned());
    plaid_base_url_for(&environment).to_owned()
}

fn plaid_base_url_for(environment: &str) -> &'static str {
    match environment {
        "production" => "https://production.plaid.com",
        "development" => "https://development.plaid.com",
        _ => "https://sandbox.plaid.com",
    }
}

fn provider_config_from_env(
    provider: Provider,
    plaid_base_url: &str,
) -> AppResult<OAuthProviderConfig> {
    let (id_var, secret_var, redirect_var) = match provider {
        Provider::Spotify => ("SPOTIFY_CLIENT_ID", "SPOTIFY_CLIENT_SECRET", "SPOTIFY_REDIRECT_URI"),
        Provider::Fitbit => ("FITBIT_CLIENT_ID", "FITBIT_CLIENT_SECRET", "FITBIT_REDIRECT_URI"),
        Provider::Google => ("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET", "GOOGLE_REDIRECT_URI"),
        Provider::Plaid => ("PLAID_CLIENT_ID", "PLAID_SECRET", "PLAID_REDIRECT_URI"),
        Provider::Notion => ("NOTION_CLIENT_ID", "NOTION_CLIENT_SECRET", "NOTION_REDIRECT_URI"),
    };

    let client_id = require_env(provider, id_var)?;
    let client_secret = require_env(provider, secret_var)?;
    // Plaid connects via Link, not a redirect; its redirect URI is optional.
    let redirect_uri = if provider == Provider::Plaid {
        env::var(redirect_var).unwrap_or_default()
    } else {
        require_env(provider, redirect_var)?
    };

    Ok(defaults_for(provider, client_id, client_secret, redirect_uri, plaid_base_url))
}

fn require_env(provider: Provider, var: &str) -> AppResult<String> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::configuration(format!(
            "provider {provider} is enabled but {var} is not set"
        ))),
    }
}

/// Endpoint and scope defaults per provider
fn defaults_for(
    provider: Provider,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    plaid_base_url: &str,
) -> OAuthProviderConfig {
    let scopes = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
    match provider {
        Provider::Spotify => OAuthProviderConfig {
            client_id,
            client_secret,
            redirect_uri,
            authorization_url: Some("https://accounts.spotify.com/authorize".to_owned()),
            token_url: Some("https://accounts.spotify.com/api/token".to_owned()),
            scope: scopes(&[
                "user-read-email",
                "user-read-private",
                "user-top-read",
                "user-read-recently-played",
            ]),
            user_info_url: Some("https://api.spotify.com/v1/me".to_owned()),
        },
        Provider::Fitbit => OAuthProviderConfig {
            client_id,
            client_secret,
            redirect_uri,
            authorization_url: Some("https://www.fitbit.com/oauth2/authorize".to_owned()),
            token_url: Some("https://api.fitbit.com/oauth2/token".to_owned()),
            scope: scopes(&["activity", "heartrate", "sleep", "weight", "profile"]),
            user_info_url: Some("https://api.fitbit.com/1/user/-/profile.json".to_owned()),
        },
        Provider::Google => OAuthProviderConfig {
            client_id,
            client_secret,
            redirect_uri,
            authorization_url: Some("https://accounts.google.com/o/oauth2/v2/auth".to_owned()),
            token_url: Some("https://oauth2.googleapis.com/token".to_owned()),
            scope: scopes(&[
                "https://www.googleapis.com/auth/userinfo.email",
                "https://www.googleapis.com/auth/userinfo.profile",
                "https://www.googleapis.com/auth/calendar.readonly",
            ]),
            user_info_url: Some("https://www.googleapis.com/oauth2/v2/userinfo".to_owned()),
        },
        Provider::Plaid => OAuthProviderConfig {
            client_id,
            client_secret,
            redirect_uri,
            authorization_url: None,
            token_url: Some(format!("{plaid_base_url}/item/public_token/exchange")),
            scope: scopes(&["transactions", "auth", "identity", "balance"]),
            user_info_url: None,
        },
        Provider::Notion => OAuthProviderConfig {
            client_id,
            client_secret,
            redirect_uri,
            authorization_url: Some("https://api.notion.com/v1/oauth/authorize".to_owned()),
            token_url: Some("https://api.notion.com/v1/oauth/token".to_owned()),
            scope: Vec::new(),
            user_info_url: Some("https://api.notion.com/v1/users/me".to_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaid_environments_map_to_base_urls() {
        assert_eq!(plaid_base_url_for("production"), "https://production.plaid.com");
        assert_eq!(plaid_base_url_for("development"), "https://development.plaid.com");
        assert_eq!(plaid_base_url_for("anything-else"), "https://sandbox.plaid.com");
    }

    #[test]
    fn notion_requests_no_scopes() {
        let config = defaults_for(
            Provider::Notion,
            "id".into(),
            "secret".into(),
            "https://app.example/callback".into(),
            "https://sandbox.plaid.com",
        );
        assert!(config.scope.is_empty());
        assert!(config.authorization_url.is_some());
    }
}
