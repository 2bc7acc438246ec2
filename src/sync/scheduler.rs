// ABOUTME: Job queue and worker pool: retry with backoff, recurring dedupe, deadlines
// ABOUTME: Semaphore-bounded tokio tasks with a DashMap job board for introspection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::errors::AppError;
use crate::models::{AuditAction, Provider};
use crate::sync::{JobStatus, QueueStats, SyncJob, SyncWorker};
use crate::utils::Clock;

/// Tuning for the queue and its retry policy
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Attempts per job before it fails terminally
    pub max_attempts: u32,
    /// Backoff after the first failed attempt; doubles each retry
    pub base_backoff: Duration,
    /// Deadline applied to each attempt so a hung upstream call cannot
    /// starve a worker
    pub job_timeout: Duration,
    /// Worker pool size
    pub max_concurrency: usize,
    /// Completed jobs older than this are pruned
    pub completed_retention: Duration,
    /// Terminally failed jobs older than this are pruned
    pub failed_retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(5),
            job_timeout: Duration::from_secs(120),
            max_concurrency: 4,
            completed_retention: Duration::from_secs(24 * 60 * 60),
            failed_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl SchedulerConfig {
    /// Backoff before retrying after the given failed attempt (1-based).
    /// Doubles per attempt, so delays are non-decreasing.
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor)
    }
}

struct JobRecord {
    job: SyncJob,
    status: JobStatus,
    finished_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct SchedulerInner {
    worker: SyncWorker,
    audit: Arc<AuditTrail>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    jobs: DashMap<Uuid, JobRecord>,
    recurring: DashMap<String, JoinHandle<()>>,
    permits: Arc<Semaphore>,
}

/// Schedules one-off and recurring sync jobs over a bounded worker pool
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    /// Build a scheduler around a worker
    #[must_use]
    pub fn new(
        worker: SyncWorker,
        audit: Arc<AuditTrail>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            inner: Arc::new(SchedulerInner {
                worker,
                audit,
                clock,
                config,
                jobs: DashMap::new(),
                recurring: DashMap::new(),
                permits,
            }),
        }
    }

    /// Enqueue a one-off sync job and return its id
    pub fn schedule_sync(&self, user_id: Uuid, provider: Provider, service_id: Uuid) -> Uuid {
        let job = SyncJob {
            id: Uuid::new_v4(),
            user_id,
            provider,
            service_id,
            attempt: 1,
            scheduled_for: self.inner.clock.now(),
        };
        let job_id = job.id;

        self.inner.jobs.insert(
            job_id,
            JobRecord {
                job: job.clone(),
                status: JobStatus::Waiting,
                finished_at: None,
                last_error: None,
            },
        );

        info!(
            target: "linkvault::sync",
            provider = %provider,
            user_id = %user_id,
            job_id = %job_id,
            "sync scheduled"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { SchedulerInner::run(inner, job).await });
        job_id
    }

    /// Register a repeating sync keyed by `sync:{user}:{provider}`.
    /// Re-registering the same pair is a no-op; returns whether a new
    /// schedule was created.
    pub fn schedule_recurring_sync(
        &self,
        user_id: Uuid,
        provider: Provider,
        service_id: Uuid,
        interval_hours: u64,
    ) -> bool {
        let key = format!("sync:{user_id}:{provider}");
        match self.inner.recurring.entry(key.clone()) {
            Entry::Occupied(_) => {
                info!(
                    target: "linkvault::sync",
                    dedupe_key = %key,
                    "recurring sync already registered"
                );
                false
            }
            Entry::Vacant(slot) => {
                let scheduler = self.clone();
                let period = Duration::from_secs(interval_hours.max(1) * 3600);
                let handle = tokio::spawn(async move {
                    let start = tokio::time::Instant::now() + period;
                    let mut ticks = tokio::time::interval_at(start, period);
                    loop {
                        ticks.tick().await;
                        scheduler.schedule_sync(user_id, provider, service_id);
                    }
                });
                slot.insert(handle);
                info!(
                    target: "linkvault::sync",
                    provider = %provider,
                    user_id = %user_id,
                    interval_hours,
                    "recurring sync registered"
                );
                true
            }
        }
    }

    /// Cancel the recurring schedule for a pair, if one exists
    pub fn cancel_recurring_sync(&self, user_id: Uuid, provider: Provider) -> bool {
        let key = format!("sync:{user_id}:{provider}");
        if let Some((_, handle)) = self.inner.recurring.remove(&key) {
            handle.abort();
            return true;
        }
        false
    }

    /// Number of registered recurring schedules
    #[must_use]
    pub fn recurring_count(&self) -> usize {
        self.inner.recurring.len()
    }

    /// Occupancy snapshot of the job board
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for record in self.inner.jobs.iter() {
            match record.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Delayed => stats.delayed += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Current state of a job, if it is still on the board
    #[must_use]
    pub fn job_status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.inner.jobs.get(&job_id).map(|record| record.status)
    }

    /// Last error recorded for a job
    #[must_use]
    pub fn job_error(&self, job_id: Uuid) -> Option<String> {
        self.inner
            .jobs
            .get(&job_id)
            .and_then(|record| record.last_error.clone())
    }

    /// Prune completed jobs older than the short retention window and
    /// failed jobs older than the long one. Returns the number removed.
    pub fn clean(&self) -> usize {
        let now = self.inner.clock.now();
        let completed_cutoff = now - to_chrono(self.inner.config.completed_retention);
        let failed_cutoff = now - to_chrono(self.inner.config.failed_retention);

        let before = self.inner.jobs.len();
        self.inner.jobs.retain(|_, record| {
            match (record.status, record.finished_at) {
                (JobStatus::Completed, Some(at)) => at > completed_cutoff,
                (JobStatus::Failed, Some(at)) => at > failed_cutoff,
                _ => true,
            }
        });
        let removed = before.saturating_sub(self.inner.jobs.len());
        if removed > 0 {
            info!(target: "linkvault::sync", removed, "pruned finished jobs");
        }
        removed
    }

    /// Abort all recurring schedules (shutdown path)
    pub fn shutdown(&self) {
        self.inner.recurring.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

impl SchedulerInner {
    fn set_status(&self, job_id: Uuid, status: JobStatus, error: Option<String>) {
        if let Some(mut record) = self.jobs.get_mut(&job_id) {
            record.status = status;
            if matches!(status, JobStatus::Completed | JobStatus::Failed) {
                record.finished_at = Some(self.clock.now());
            }
            if let Some(message) = error {
                record.last_error = Some(message);
            }
        }
    }

    fn bump_attempt(&self, job_id: Uuid, attempt: u32) {
        if let Some(mut record) = self.jobs.get_mut(&job_id) {
            record.job.attempt = attempt;
        }
    }

    async fn run(inner: Arc<Self>, mut job: SyncJob) {
        loop {
            let Ok(permit) = inner.permits.acquire().await else {
                return;
            };
            inner.set_status(job.id, JobStatus::Active, None);

            let outcome =
                match tokio::time::timeout(inner.config.job_timeout, inner.worker.process(&job))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AppError::retryable(format!(
                        "job exceeded its {}s deadline",
                        inner.config.job_timeout.as_secs()
                    ))),
                };
            drop(permit);

            match outcome {
                Ok(()) => {
                    inner.set_status(job.id, JobStatus::Completed, None);
                    return;
                }
                Err(err) => {
                    inner
                        .audit
                        .record(
                            AuditAction::DataSync,
                            job.provider.as_str(),
                            job.user_id,
                            json!({
                                "provider": job.provider.as_str(),
                                "success": false,
                                "error": err.to_string(),
                                "attempt": job.attempt,
                            }),
                        )
                        .await;

                    let retry = err.is_retryable() && job.attempt < inner.config.max_attempts;
                    if !retry {
                        warn!(
                            target: "linkvault::sync",
                            provider = %job.provider,
                            user_id = %job.user_id,
                            job_id = %job.id,
                            attempt = job.attempt,
                            error = %err,
                            "sync failed terminally"
                        );
                        inner.set_status(job.id, JobStatus::Failed, Some(err.to_string()));
                        return;
                    }

                    let delay = inner.config.backoff_for_attempt(job.attempt);
                    warn!(
                        target: "linkvault::sync",
                        provider = %job.provider,
                        job_id = %job.id,
                        attempt = job.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "sync attempt failed, backing off"
                    );
                    inner.set_status(job.id, JobStatus::Delayed, Some(err.to_string()));
                    tokio::time::sleep(delay).await;
                    job.attempt += 1;
                    inner.bump_attempt(job.id, job.attempt);
                }
            }
        }
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_never_decreases() {
        let config = SchedulerConfig {
            base_backoff: Duration::from_secs(5),
            ..SchedulerConfig::default()
        };
        let delays: Vec<Duration> = (1..=4).map(|a| config.backoff_for_attempt(a)).collect();
        assert_eq!(delays[0], Duration::from_secs(5));
        assert_eq!(delays[1], Duration::from_secs(10));
        assert_eq!(delays[2], Duration::from_secs(20));
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
