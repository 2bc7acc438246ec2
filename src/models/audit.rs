// ABOUTME: Append-only audit event models for credential and sync lifecycle tracking
// ABOUTME: AuditAction enum and AuditLogEntry DTO with builder-style metadata
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle actions recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A provider account was connected (or reconnected) via OAuth
    ServiceConnected,
    /// A provider account was disconnected (soft delete)
    ServiceDisconnected,
    /// An access token was refreshed and re-encrypted
    OauthRefresh,
    /// A synchronization ran; metadata records success or failure
    DataSync,
}

/// One append-only audit record. Entries are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique entry identifier
    pub id: Uuid,
    /// User the action was performed for
    pub user_id: Uuid,
    /// What happened
    pub action: AuditAction,
    /// Affected resource, e.g. `spotify:31k5xo2f`
    pub resource: String,
    /// Structured event detail
    pub metadata: serde_json::Value,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Create a new entry timestamped now
    #[must_use]
    pub fn new(user_id: Uuid, action: AuditAction, resource: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action,
            resource,
            metadata: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Attach structured metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
