// ABOUTME: In-memory reference implementations of the storage contracts
// ABOUTME: DashMap-backed service rows with CAS semantics and an append-only audit vec
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{AuditLogEntry, ConnectedService, Provider};
use crate::storage::{AuditStore, NewConnectedService, ServiceStore, TokenUpdate};

/// DashMap-backed [`ServiceStore`] with a (user, provider) uniqueness index
#[derive(Default)]
pub struct InMemoryServiceStore {
    rows: DashMap<Uuid, ConnectedService>,
    index: DashMap<(Uuid, Provider), Uuid>,
}

impl InMemoryServiceStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceStore for InMemoryServiceStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ConnectedService>> {
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }

    async fn find_by_user_and_provider(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> AppResult<Option<ConnectedService>> {
        let Some(id) = self.index.get(&(user_id, provider)).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConnectedService>> {
        let mut services: Vec<ConnectedService> = self
            .rows
            .iter()
            .filter(|row| row.user_id == user_id && row.is_active)
            .map(|row| row.value().clone())
            .collect();
        services.sort_by_key(|s| s.created_at);
        Ok(services)
    }

    async fn upsert(&self, service: NewConnectedService) -> AppResult<ConnectedService> {
        let key = (service.user_id, service.provider);
        let now = Utc::now();

        if let Some(existing_id) = self.index.get(&key).map(|e| *e) {
            let mut row = self.rows.get_mut(&existing_id).ok_or_else(|| {
                AppError::store("service index points at a missing row")
            })?;
            row.provider_user_id = service.provider_user_id;
            row.access_token = service.access_token;
            row.refresh_token = service.refresh_token;
            row.token_expires_at = service.token_expires_at;
            row.scope = service.scope;
            row.metadata = service.metadata;
            row.is_active = true;
            row.updated_at = now;
            return Ok(row.clone());
        }

        let row = ConnectedService {
            id: Uuid::new_v4(),
            user_id: service.user_id,
            provider: service.provider,
            provider_user_id: service.provider_user_id,
            access_token: service.access_token,
            refresh_token: service.refresh_token,
            token_expires_at: service.token_expires_at,
            scope: service.scope,
            is_active: true,
            last_sync_at: None,
            metadata: service.metadata,
            created_at: now,
            updated_at: now,
        };
        self.index.insert(key, row.id);
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        update: &TokenUpdate,
    ) -> AppResult<ConnectedService> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::store(format!("unknown service {id}")))?;

        if row.updated_at != expected_updated_at {
            return Err(AppError::conflict(format!(
                "service {id} was modified concurrently"
            )));
        }

        row.access_token = update.access_token.clone();
        row.refresh_token = update.refresh_token.clone();
        row.token_expires_at = update.token_expires_at;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn touch_last_sync(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::store(format!("unknown service {id}")))?;
        row.last_sync_at = Some(at);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_inactive(&self, id: Uuid) -> AppResult<()> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::store(format!("unknown service {id}")))?;
        row.is_active = false;
        row.updated_at = Utc::now();
        Ok(())
    }
}

/// Vec-backed append-only [`AuditStore`]
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all users
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn len(&self) -> AppResult<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| AppError::internal("audit store lock poisoned"))?
            .len())
    }

    /// Whether the store holds no entries
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> AppResult<()> {
        self.entries
            .write()
            .map_err(|_| AppError::internal("audit store lock poisoned"))?
            .push(entry);
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<AuditLogEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| AppError::internal("audit store lock poisoned"))?
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect())
    }
}
