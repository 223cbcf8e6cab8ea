//! RetrySweeper - recovers work the normal flow left behind.
//!
//! - `pending` jobs whose fan-out never finished get their descriptors enqueued
//! - `processing` jobs past the job timeout have their unleased pending sources failed
//!
//! Expired leases need no sweeping: the queue makes them leasable again on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::orchestrator::JobOrchestrator;
use crate::domain::{JobId, JobStatus, PersonaError, Source};
use crate::ports::{Clock, JobStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredJob {
    pub job_id: JobId,
    pub sources: Vec<Source>,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub resumed: Vec<JobId>,
    pub expired: Vec<ExpiredJob>,
    /// Jobs the sweep could not handle this round.
    pub errors: usize,
}

pub struct RetrySweeper {
    orchestrator: Arc<JobOrchestrator>,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
}

impl RetrySweeper {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            clock,
            wake,
        }
    }

    /// One sweep over pending and processing jobs.
    ///
    /// A failure on one job is logged and counted; the sweep moves on. Only a failure
    /// to list jobs at all is returned as an error.
    pub async fn sweep_stuck_jobs(&self) -> Result<SweepReport, PersonaError> {
        let mut report = SweepReport::default();

        for job in self.store.jobs_with_status(JobStatus::Pending).await? {
            match self.orchestrator.resume_pending(job.id).await {
                Ok(true) => report.resumed.push(job.id),
                Ok(false) => {}
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "resuming pending job failed");
                    report.errors += 1;
                }
            }
        }

        let timeout = self.orchestrator.config().job_timeout;
        let now = self.clock.now();
        for job in self.store.jobs_with_status(JobStatus::Processing).await? {
            if !is_older_than(job.created_at, now, timeout) {
                continue;
            }
            match self.orchestrator.expire_stuck_sources(job.id).await {
                Ok(Some((sources, status))) => report.expired.push(ExpiredJob {
                    job_id: job.id,
                    sources,
                    status,
                }),
                Ok(None) => {}
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "expiring stuck job failed");
                    report.errors += 1;
                }
            }
        }

        if !report.resumed.is_empty() || !report.expired.is_empty() {
            info!(
                resumed = report.resumed.len(),
                expired = report.expired.len(),
                errors = report.errors,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Wakes idle workers for an immediate lease cycle.
    pub fn trigger_processing(&self) {
        self.wake.notify_waiters();
    }

    /// Sweeps every `interval` until `shutdown` flips to `true`.
    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match self.sweep_stuck_jobs().await {
                            Ok(report) if !report.resumed.is_empty() => self.trigger_processing(),
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

fn is_older_than(created_at: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    crate::ports::clock::elapsed(created_at, now) >= timeout
}
