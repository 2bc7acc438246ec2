// ABOUTME: Collaborator storage contracts for connected services and audit entries
// ABOUTME: ServiceStore (row-store with CAS updates) and AuditStore (append-only log)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Storage Contracts
//!
//! The relational persistence layer is an external collaborator; this crate
//! depends only on two trait contracts. [`ServiceStore`] is the row-store
//! for [`ConnectedService`] with upsert semantics on (user, provider) and a
//! compare-and-swap token update to prevent lost writes under concurrent
//! refresh. [`AuditStore`] is an append-only log. The `memory` module
//! provides reference backends used by tests and single-process embedders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::{AuditLogEntry, ConnectedService, EncryptedSecret, Provider};

/// In-memory reference backends
pub mod memory;

pub use memory::{InMemoryAuditStore, InMemoryServiceStore};

/// Fields written when a service is connected or reconnected
#[derive(Debug, Clone)]
pub struct NewConnectedService {
    /// Owning user
    pub user_id: Uuid,
    /// Provider being connected
    pub provider: Provider,
    /// The user's identifier on the provider side
    pub provider_user_id: String,
    /// Encrypted access token
    pub access_token: EncryptedSecret,
    /// Encrypted refresh token, if granted
    pub refresh_token: Option<EncryptedSecret>,
    /// Access token expiry, if reported
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Scope string as granted
    pub scope: Option<String>,
    /// Provider-specific metadata blob
    pub metadata: serde_json::Value,
}

/// Fields rewritten together on every token refresh
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    /// New encrypted access token (fresh IV and tag)
    pub access_token: EncryptedSecret,
    /// New encrypted refresh token (fresh IV and tag), if any
    pub refresh_token: Option<EncryptedSecret>,
    /// New expiry for the access token
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Row-store contract for [`ConnectedService`]
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Load a service by row id
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ConnectedService>>;

    /// Load the unique service for a (user, provider) pair, active or not
    async fn find_by_user_and_provider(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> AppResult<Option<ConnectedService>>;

    /// All active services for a user
    async fn list_active_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConnectedService>>;

    /// Create or update the unique (user, provider) row. Reconnecting a
    /// previously disconnected service reactivates it in place.
    async fn upsert(&self, service: NewConnectedService) -> AppResult<ConnectedService>;

    /// Rewrite the token fields of a row, conditional on `expected_updated_at`
    /// matching the stored `updated_at`. Returns a conflict error when another
    /// writer got there first.
    async fn update_tokens(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        update: &TokenUpdate,
    ) -> AppResult<ConnectedService>;

    /// Record the completion time of a successful sync
    async fn touch_last_sync(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    /// Soft-delete: clears `is_active`, preserving the row for audit
    async fn mark_inactive(&self, id: Uuid) -> AppResult<()>;
}

/// Append-only audit log contract
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry. Entries are never mutated or deleted.
    async fn append(&self, entry: AuditLogEntry) -> AppResult<()>;

    /// Entries for one user, oldest first
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<AuditLogEntry>>;
}
