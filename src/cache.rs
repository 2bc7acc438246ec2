// ABOUTME: TTL-bounded read-through cache for normalized provider payloads
// ABOUTME: CacheStore trait with an in-memory backend and a CacheLayer wrapper
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Cache Layer
//!
//! Payloads are keyed by (user, provider, window-in-days) and expire after a
//! fixed TTL. Reads are best effort: a backend failure degrades to a miss
//! and the caller falls through to the provider. There is no single-flight
//! deduplication; two concurrent misses for the same key may both fetch and
//! both write, and the last writer wins.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::Provider;

/// Cache key for one normalized payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Owning user
    pub user_id: Uuid,
    /// Provider the payload came from
    pub provider: Provider,
    /// Time window of the payload in days
    pub window_days: u32,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data:{}:{}:{}",
            self.user_id, self.provider, self.window_days
        )
    }
}

/// Cache backend contract
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry, `None` on miss or expiry
    async fn get(&self, key: &CacheKey) -> AppResult<Option<Value>>;

    /// Store an entry that expires after `ttl`
    async fn set_with_ttl(&self, key: &CacheKey, value: &Value, ttl: Duration) -> AppResult<()>;

    /// Drop all entries for a (user, provider) pair, returning the count
    async fn invalidate(&self, user_id: Uuid, provider: Provider) -> AppResult<u64>;
}

struct StoredEntry {
    value: Value,
    expires_at: Instant,
}

/// DashMap-backed [`CacheStore`]. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, StoredEntry>,
}

impl InMemoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including not-yet-collected expired ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<Value>> {
        let rendered = key.to_string();
        if let Some(entry) = self.entries.get(&rendered) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Lazy expiry: remove only if still expired under the write lock.
        self.entries
            .remove_if(&rendered, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &CacheKey, value: &Value, ttl: Duration) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, user_id: Uuid, provider: Provider) -> AppResult<u64> {
        let prefix = format!("data:{user_id}:{provider}:");
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}

/// Read-through wrapper owning the TTL policy
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CacheLayer {
    /// Fixed TTL applied to every payload
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    /// Wrap a backend with the given TTL
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Look up a payload. Backend errors degrade to a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Value> {
        match self.store.get(key).await {
            Ok(Some(value)) => {
                debug!(target: "linkvault::cache", key = %key, cache_hit = true, "cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(target: "linkvault::cache", key = %key, cache_hit = false, "cache miss");
                None
            }
            Err(e) => {
                warn!(target: "linkvault::cache", key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a payload under the configured TTL.
    ///
    /// # Errors
    ///
    /// Propagates backend write failures; sync jobs treat them as retryable.
    pub async fn store(&self, key: &CacheKey, value: &Value) -> AppResult<()> {
        self.store.set_with_ttl(key, value, self.ttl).await
    }

    /// Drop all entries for a (user, provider) pair
    pub async fn invalidate(&self, user_id: Uuid, provider: Provider) -> u64 {
        match self.store.invalidate(user_id, provider).await {
            Ok(count) => count,
            Err(e) => {
                warn!(target: "linkvault::cache", error = %e, "cache invalidation failed");
                0
            }
        }
    }
}
