// ABOUTME: Core data models for connected services, providers, and token material
// ABOUTME: Defines the Provider enum, ConnectedService row shape, and OAuth token DTOs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

/// Audit event models
pub mod audit;

pub use audit::{AuditAction, AuditLogEntry};

/// The five third-party account providers the platform aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Music streaming (listening history, top tracks)
    Spotify,
    /// Fitness tracking (activity, heart rate, sleep)
    Fitbit,
    /// Calendar (events, meeting load)
    Google,
    /// Banking via Plaid Link (accounts, transactions)
    Plaid,
    /// Workspace (pages, databases)
    Notion,
}

impl Provider {
    /// All supported providers, in registry order
    pub const ALL: [Self; 5] = [
        Self::Spotify,
        Self::Fitbit,
        Self::Google,
        Self::Plaid,
        Self::Notion,
    ];

    /// Canonical lowercase identifier used in cache keys, audit resources,
    /// and configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::Fitbit => "fitbit",
            Self::Google => "google",
            Self::Plaid => "plaid",
            Self::Notion => "notion",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spotify" => Ok(Self::Spotify),
            "fitbit" => Ok(Self::Fitbit),
            "google" => Ok(Self::Google),
            "plaid" => Ok(Self::Plaid),
            "notion" => Ok(Self::Notion),
            other => Err(AppError::configuration(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}

/// One independently encrypted secret. Every encryption carries its own IV
/// and auth tag; two secrets never share an IV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Base64-encoded AES-256-GCM ciphertext
    pub ciphertext: String,
    /// Hex-encoded 12-byte nonce, unique per encryption
    pub iv: String,
    /// Hex-encoded 16-byte authentication tag
    pub auth_tag: String,
}

/// Plaintext token set as returned by a provider token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// Short-lived credential for API calls
    pub access_token: String,
    /// Longer-lived credential used to mint new access tokens, if granted
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds, if reported
    pub expires_in: Option<u64>,
    /// Token type, usually "Bearer"
    pub token_type: Option<String>,
    /// Scope string as granted by the provider
    pub scope: Option<String>,
}

/// Result of the Plaid public-token exchange (Link-based connect flow)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaidAccess {
    /// Long-lived Plaid access token (no expiry, no refresh)
    pub access_token: String,
    /// Plaid item identifier, used as the provider user id
    pub item_id: String,
}

/// Durable link between one user and one provider account.
///
/// Unique per (`user_id`, `provider`). A disconnect soft-deletes by setting
/// `is_active = false`; the row and its audit history are never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedService {
    /// Row identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Which provider this link is for
    pub provider: Provider,
    /// The user's identifier on the provider side
    pub provider_user_id: String,
    /// Encrypted access token
    pub access_token: EncryptedSecret,
    /// Encrypted refresh token, if the provider granted one
    pub refresh_token: Option<EncryptedSecret>,
    /// When the access token expires; `None` for non-expiring tokens
    pub token_expires_at: Option<DateTime<Utc>>,
    /// OAuth scopes granted
    pub scope: Option<String>,
    /// False after disconnect; reactivated by reconnecting
    pub is_active: bool,
    /// Completion time of the most recent successful sync
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Provider-specific metadata (typically the user-info payload)
    pub metadata: serde_json::Value,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time; the optimistic-concurrency token for updates
    pub updated_at: DateTime<Utc>,
}

impl ConnectedService {
    /// Whether the access token is expired at `now`. Tokens without an
    /// expiry (e.g. Plaid) never expire.
    #[must_use]
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at.is_some_and(|expires| expires < now)
    }

    /// Audit resource string: `{provider}:{provider_user_id}`
    #[must_use]
    pub fn audit_resource(&self) -> String {
        format!("{}:{}", self.provider, self.provider_user_id)
    }
}

/// Secret-free view of a connected service, safe to hand to the route layer.
/// Token ciphertext, IVs, and auth tags are structurally absent.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedServiceSummary {
    /// Row identifier
    pub id: Uuid,
    /// Which provider this link is for
    pub provider: Provider,
    /// The user's identifier on the provider side
    pub provider_user_id: String,
    /// OAuth scopes granted
    pub scope: Option<String>,
    /// False after disconnect
    pub is_active: bool,
    /// When the access token expires
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Completion time of the most recent successful sync
    pub last_sync_at: Option<DateTime<Utc>>,
    /// When the service was first connected
    pub connected_at: DateTime<Utc>,
}

impl From<&ConnectedService> for ConnectedServiceSummary {
    fn from(service: &ConnectedService) -> Self {
        Self {
            id: service.id,
            provider: service.provider,
            provider_user_id: service.provider_user_id.clone(),
            scope: service.scope.clone(),
            is_active: service.is_active,
            token_expires_at: service.token_expires_at,
            last_sync_at: service.last_sync_at,
            connected_at: service.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().ok(), Some(provider));
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!("strava".parse::<Provider>().is_err());
    }
}
