// ABOUTME: Best-effort audit trail for credential and sync lifecycle events
// ABOUTME: Records to the append-only store; write failures are logged, never propagated
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Audit Trail
//!
//! Every credential and sync event is appended here. Recording is strictly
//! log-and-continue: a failure to persist an audit entry must never abort
//! the operation it annotates, so [`AuditTrail::record`] is infallible from
//! the caller's perspective and reports store failures through tracing.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AuditAction, AuditLogEntry};
use crate::storage::AuditStore;

/// Append-only recorder of lifecycle events
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
}

impl AuditTrail {
    /// Wrap an audit store
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append one entry, best effort
    pub async fn record(
        &self,
        action: AuditAction,
        resource: impl Into<String>,
        user_id: Uuid,
        metadata: Value,
    ) {
        let entry = AuditLogEntry::new(user_id, action, resource.into()).with_metadata(metadata);

        info!(
            target: "linkvault::audit",
            action = ?entry.action,
            resource = %entry.resource,
            user_id = %entry.user_id,
            "audit event"
        );

        if let Err(e) = self.store.append(entry).await {
            warn!(
                target: "linkvault::audit",
                error = %e,
                "failed to append audit entry; continuing"
            );
        }
    }
}
