// ABOUTME: Background synchronization engine: jobs, per-pair locks, worker, scheduler
// ABOUTME: Defines the SyncJob model, job states, queue stats, and PairLocks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Sync Engine
//!
//! One [`SyncJob`] synchronizes one (user, provider) pair: refresh the token
//! if stale, fetch normalized data through the adapter, populate the cache,
//! stamp `last_sync_at`, and record an audit entry. The
//! [`scheduler::SyncScheduler`] owns retry with exponential backoff,
//! idempotent recurring registration, per-job deadlines, introspection, and
//! pruning; [`worker::SyncWorker`] owns the job body.
//!
//! Jobs for different pairs have no ordering guarantees. Two jobs for the
//! same pair serialize on a [`PairLocks`] mutex around the
//! refresh-then-fetch sequence so racing refreshes cannot clobber each
//! other's rotated refresh token.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::Provider;

/// Per-job retry and deadline policy plus queue-wide tuning
pub mod scheduler;
/// The body of one sync job
pub mod worker;

pub use scheduler::{SchedulerConfig, SyncScheduler};
pub use worker::SyncWorker;

/// One queued synchronization of a (user, provider) pair
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Job identifier
    pub id: Uuid,
    /// User being synchronized
    pub user_id: Uuid,
    /// Provider being synchronized
    pub provider: Provider,
    /// The connected-service row this job operates on
    pub service_id: Uuid,
    /// 1-based attempt counter
    pub attempt: u32,
    /// When the job became runnable
    pub scheduled_for: DateTime<Utc>,
}

/// Job state machine: `Waiting → Active → {Completed | Delayed → Active … | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Enqueued, not yet picked up by a worker
    Waiting,
    /// Running on a worker
    Active,
    /// Failed retryably; sleeping out its backoff
    Delayed,
    /// Finished successfully
    Completed,
    /// Failed terminally; kept for inspection until pruned
    Failed,
}

/// Snapshot of queue occupancy by state
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    /// Jobs waiting for a worker
    pub waiting: usize,
    /// Jobs currently running
    pub active: usize,
    /// Jobs that finished successfully
    pub completed: usize,
    /// Jobs that failed terminally
    pub failed: usize,
    /// Jobs sleeping out a retry backoff
    pub delayed: usize,
}

/// Async mutex table serializing work on one (user, provider) pair within
/// this process
#[derive(Default)]
pub struct PairLocks {
    locks: DashMap<(Uuid, Provider), Arc<Mutex<()>>>,
}

impl PairLocks {
    /// Create an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a pair, creating it on first use. The guard
    /// serializes refresh-then-fetch sequences for the pair.
    pub async fn acquire(&self, user_id: Uuid, provider: Provider) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.locks.entry((user_id, provider)).or_default());
        lock.lock_owned().await
    }
}
