// ABOUTME: Unified error handling for credential, provider, and sync failures
// ABOUTME: Defines the AppError taxonomy and retryability classification for sync jobs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Unified Error Handling
//!
//! Every fallible operation in the crate returns [`AppResult`]. The variants
//! map onto the failure domains of the system: boot-time configuration,
//! provider token endpoints, provider data APIs, the credential vault, and
//! the sync pipeline. [`AppError::is_retryable`] is the single source of
//! truth the job queue consults when deciding between backoff and terminal
//! failure.

use crate::models::Provider;
use thiserror::Error;

/// Result alias used throughout the crate
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Provider unconfigured, missing secret, or invalid boot configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-2xx or malformed response from a provider token endpoint
    /// (authorize/exchange/refresh/userinfo)
    #[error("{provider} token endpoint error: {message}")]
    ProviderExchange {
        /// Provider whose endpoint failed
        provider: Provider,
        /// Upstream error detail
        message: String,
        /// HTTP status, if a response was received
        status: Option<u16>,
    },

    /// Non-2xx or malformed response from a provider data API during a sync
    #[error("{provider} {endpoint} fetch failed: {message}")]
    ProviderApi {
        /// Provider whose API failed
        provider: Provider,
        /// Which sub-fetch failed (e.g. "recently-played", "transactions")
        endpoint: &'static str,
        /// Upstream error detail
        message: String,
        /// HTTP status, if a response was received
        status: Option<u16>,
    },

    /// Auth tag verification failed: tampered ciphertext or wrong key
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// No usable token and no refresh path; caller must re-authorize
    #[error("authorization required: {0}")]
    Auth(String),

    /// Transient sync failure eligible for backoff and retry
    #[error("retryable sync failure: {0}")]
    RetryableSync(String),

    /// Permanent sync failure; the job must not be retried
    #[error("terminal sync failure: {0}")]
    TerminalSync(String),

    /// Optimistic concurrency check failed on a row update
    #[error("conflicting update: {0}")]
    Conflict(String),

    /// Row-store or audit-store operation failed
    #[error("store error: {0}")]
    Store(String),

    /// Cache backend operation failed
    #[error("cache error: {0}")]
    Cache(String),

    /// Invariant violation or unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a token endpoint error for the given provider
    pub fn exchange(provider: Provider, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ProviderExchange {
            provider,
            message: message.into(),
            status,
        }
    }

    /// Create a data API error naming the sub-fetch that failed
    pub fn api(
        provider: Provider,
        endpoint: &'static str,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProviderApi {
            provider,
            endpoint,
            message: message.into(),
            status,
        }
    }

    /// Create a decryption error
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption(message.into())
    }

    /// Create an authorization-required error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a retryable sync error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::RetryableSync(message.into())
    }

    /// Create a terminal sync error
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::TerminalSync(message.into())
    }

    /// Create an optimistic-concurrency conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a sync job failing with this error should be re-enqueued
    /// with backoff rather than marked terminally failed.
    ///
    /// Network errors and 5xx/429 responses are transient. Decryption
    /// failures are never retried: a tampered or mis-keyed secret will not
    /// become valid on a second attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RetryableSync(_)
            | Self::Conflict(_)
            | Self::Store(_)
            | Self::Cache(_)
            | Self::Internal(_) => true,
            Self::ProviderExchange { status, .. } | Self::ProviderApi { status, .. } => {
                retryable_status(*status)
            }
            Self::Configuration(_)
            | Self::Decryption(_)
            | Self::Auth(_)
            | Self::TerminalSync(_) => false,
        }
    }
}

/// A missing status means the request never completed (network failure or
/// malformed body), which is worth retrying. 429 and 5xx are transient.
const fn retryable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(code) => code == 429 || code >= 500,
    }
}
