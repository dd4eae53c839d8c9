//! Periodic housekeeping scheduler.
//!
//! A fixed registry of jobs, populated at startup, each guarded by a
//! cluster-wide named lock so at most one worker runs it at a time. The
//! lock lease bounds how long a crashed run can block the next one; when a
//! job outlives its lease the release fails and surfaces as a warning.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::domain::ports::ClusterLock;
use crate::services::purge::PurgeService;

/// Lease on a periodic-job lock.
const JOB_LOCK_LEASE_SECS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    PurgeDatabase,
    PurgeEventIndices,
}

struct PeriodicJob {
    name: &'static str,
    every: StdDuration,
    kind: JobKind,
}

pub struct Scheduler {
    lock: Arc<dyn ClusterLock>,
    purge: Arc<PurgeService>,
    holder: String,
    jobs: Vec<PeriodicJob>,
}

impl Scheduler {
    pub fn new(lock: Arc<dyn ClusterLock>, purge: Arc<PurgeService>, holder: String) -> Self {
        let jobs = vec![
            PeriodicJob {
                name: "purge_database",
                every: StdDuration::from_secs(24 * 60 * 60),
                kind: JobKind::PurgeDatabase,
            },
            PeriodicJob {
                name: "purge_event_indices",
                every: StdDuration::from_secs(24 * 60 * 60),
                kind: JobKind::PurgeEventIndices,
            },
        ];
        Self { lock, purge, holder, jobs }
    }

    pub async fn run(self: Arc<Self>) {
        info!(holder = %self.holder, "periodic scheduler started");
        let mut handles = Vec::with_capacity(self.jobs.len());
        for idx in 0..self.jobs.len() {
            let scheduler = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let job = &scheduler.jobs[idx];
                let mut ticker = interval(job.every);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // swallow the immediate first tick; jobs run a full period
                // after startup
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    scheduler.run_guarded(job).await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Run one job under its cluster lock; skip silently when another
    /// worker holds it.
    async fn run_guarded(&self, job: &PeriodicJob) {
        let lease = Duration::seconds(JOB_LOCK_LEASE_SECS);
        debug!(job = job.name, "acquiring job lock");
        match self.lock.try_acquire(job.name, &self.holder, lease).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(job = job.name, "could not acquire job lock");
                return;
            }
            Err(e) => {
                error!(job = job.name, reason = %e, "job lock acquisition failed");
                return;
            }
        }

        let result = match job.kind {
            JobKind::PurgeDatabase => self.purge.purge_database().await.map(|_| ()),
            JobKind::PurgeEventIndices => self.purge.purge_event_indices().await.map(|_| ()),
        };
        if let Err(e) = result {
            error!(job = job.name, reason = %e, "job failed");
        }

        match self.lock.release(job.name, &self.holder).await {
            Ok(true) => debug!(job = job.name, "released job lock"),
            Ok(false) => warn!(job = job.name, "job lock lease expired before release"),
            Err(e) => error!(job = job.name, reason = %e, "job lock release failed"),
        }
    }
}
