//! JobOrchestrator - creates jobs, folds collector outcomes into them, settles them.
//!
//! Every read-modify-write of a job happens under that job's lock. Jobs never
//! contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::collector::payload_for;
use crate::config::EngineConfig;
use crate::domain::{
    CollectorOutcome, Decider, Decision, Job, JobDataRecord, JobId, JobInputs, JobStatus,
    PersonaError, ReportDisposition, Source, SourceOutcome, TaskDescriptor,
};
use crate::ports::clock::{self, Clock};
use crate::ports::{Cache, IdGenerator, JobStore, TaskQueue};

/// Result of `report_outcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    #[serde(flatten)]
    pub disposition: ReportDisposition,
    pub job_status: JobStatus,
}

/// One lock per job, created on first use and dropped once the job is terminal.
#[derive(Default)]
struct JobLocks {
    locks: Mutex<HashMap<JobId, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobLocks {
    async fn lock(&self, job_id: JobId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(job_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Terminal jobs take no further writes, so their lock can go.
    fn forget(&self, job_id: JobId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    decider: Arc<dyn Decider>,
    config: EngineConfig,
    locks: JobLocks,
    wake: Arc<Notify>,
}

impl JobOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        decider: Arc<dyn Decider>,
        config: EngineConfig,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
            clock,
            ids,
            decider,
            config,
            locks: JobLocks::default(),
            wake,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates inputs, persists a pending job and fans it out into one descriptor
    /// per expected source.
    ///
    /// If descriptors cannot all be enqueued the job is still created and stays
    /// `pending`; the sweeper finishes the fan-out later.
    pub async fn create_job(&self, inputs: JobInputs) -> Result<JobId, PersonaError> {
        let inputs = inputs.normalized()?;
        let expected = inputs.expected_sources();
        let now = self.clock.now();
        let job_id = self.ids.generate_job_id();

        let mut job = Job::new(job_id, inputs, expected, now);
        for source in job.expected_sources.clone() {
            if !self.config.is_enabled(source) {
                job.record_outcome(source, SourceOutcome::Skipped, now);
            }
        }

        let _guard = self.locks.lock(job_id).await;
        self.store.insert_job(&job).await?;
        info!(
            job_id = %job_id,
            sources = ?job.expected_sources,
            "job created"
        );

        self.fan_out(&mut job).await?;
        Ok(job_id)
    }

    /// Enqueues a descriptor for every pending source, then moves the job to
    /// `processing`. Returns `false` (job left `pending`) if any enqueue kept failing.
    async fn fan_out(&self, job: &mut Job) -> Result<bool, PersonaError> {
        for source in job.pending_sources() {
            let payload = payload_for(source, &job.inputs)?;
            let descriptor = TaskDescriptor::new(
                self.ids.generate_task_id(),
                job.id,
                source,
                payload,
                self.config.max_attempts,
                self.clock.now(),
            );
            if let Err(err) = self.enqueue_with_retry(descriptor).await {
                warn!(
                    job_id = %job.id,
                    source = %source,
                    error = %err,
                    "enqueue failed; job left pending for the sweeper"
                );
                return Ok(false);
            }
        }

        let now = self.clock.now();
        job.transition(JobStatus::Processing, now)?;
        // Sources that reported while the job was still pending may already settle it.
        job.settle(self.config.completion_policy, now)?;
        self.persist(job).await?;
        self.wake.notify_waiters();
        Ok(true)
    }

    async fn enqueue_with_retry(&self, descriptor: TaskDescriptor) -> Result<(), PersonaError> {
        let attempts = self.config.enqueue_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.queue.enqueue(descriptor.clone()).await {
                Ok(task_id) => {
                    debug!(
                        job_id = %descriptor.job_id,
                        source = %descriptor.source,
                        task_id = %task_id,
                        "descriptor enqueued"
                    );
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        job_id = %descriptor.job_id,
                        source = %descriptor.source,
                        attempt,
                        error = %err,
                        "enqueue attempt failed"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| PersonaError::Internal("enqueue never attempted".to_string())))
    }

    /// Folds one collector outcome into the job.
    ///
    /// Reports for a source that is already terminal are no-ops (`Duplicate`); any
    /// descriptor still lingering for that source is acked.
    pub async fn report_outcome(
        &self,
        job_id: JobId,
        source: Source,
        outcome: CollectorOutcome,
    ) -> Result<ReportResult, PersonaError> {
        let _guard = self.locks.lock(job_id).await;
        let mut job = self.load(job_id).await?;

        let Some(current) = job.outcome(source) else {
            return Err(PersonaError::Validation(format!(
                "source {source} is not expected for job {job_id}"
            )));
        };

        if current.is_terminal() {
            debug!(job_id = %job_id, source = %source, outcome = ?current, "duplicate report ignored");
            self.ack_source(job_id, source).await?;
            return Ok(ReportResult {
                disposition: ReportDisposition::Duplicate,
                job_status: job.status,
            });
        }

        let now = self.clock.now();
        let disposition = match outcome {
            CollectorOutcome::Succeeded(data) => {
                self.store
                    .put_data(JobDataRecord {
                        job_id,
                        source,
                        data,
                        collected_at: now,
                    })
                    .await?;
                job.record_outcome(source, SourceOutcome::Succeeded, now);
                ReportDisposition::Recorded
            }
            CollectorOutcome::Failed(err) => {
                job.record_error(source, err.message.clone());
                match self.queue.find(job_id, source).await? {
                    Some(descriptor) => {
                        let updated = self
                            .queue
                            .record_failure(descriptor.id, err.is_permanent())
                            .await?;
                        match self.decider.decide(&updated, &err) {
                            Decision::Retry { delay } => {
                                self.queue.requeue(updated.id, delay).await?;
                                warn!(
                                    job_id = %job_id,
                                    source = %source,
                                    attempt = updated.attempt_count,
                                    max_attempts = updated.max_attempts,
                                    delay_secs = delay.as_secs(),
                                    error = %err.message,
                                    "collector failed; retrying"
                                );
                                job.updated_at = now;
                                ReportDisposition::Retrying {
                                    attempt: updated.attempt_count,
                                    delay_secs: delay.as_secs(),
                                }
                            }
                            Decision::GiveUp { reason } => {
                                warn!(job_id = %job_id, source = %source, reason = %reason, "source failed");
                                job.record_error(source, reason);
                                job.record_outcome(source, SourceOutcome::Failed, now);
                                ReportDisposition::Exhausted
                            }
                        }
                    }
                    None => {
                        // Without a descriptor there is no attempt budget to draw on.
                        warn!(job_id = %job_id, source = %source, "failure reported with no live descriptor");
                        job.record_outcome(source, SourceOutcome::Failed, now);
                        ReportDisposition::Exhausted
                    }
                }
            }
        };

        job.settle(self.config.completion_policy, now)?;
        self.persist(&job).await?;

        if job.outcome(source).is_some_and(SourceOutcome::is_terminal) {
            self.ack_source(job_id, source).await?;
        }

        Ok(ReportResult {
            disposition,
            job_status: job.status,
        })
    }

    /// Job snapshot. Terminal jobs are served from the cache when possible.
    pub async fn get_status(&self, job_id: JobId) -> Result<Job, PersonaError> {
        let key = cache_key(job_id);
        match self.cache.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value::<Job>(value) {
                Ok(job) => return Ok(job),
                Err(e) => warn!(job_id = %job_id, error = %e, "discarding undecodable cached job"),
            },
            Ok(None) => {}
            Err(e) => warn!(job_id = %job_id, error = %e, "cache read failed; falling back to store"),
        }

        let job = self.load(job_id).await?;
        if job.status.is_terminal() {
            self.cache_terminal(&job).await;
        }
        Ok(job)
    }

    /// Everything collected for a job so far.
    pub async fn job_data(&self, job_id: JobId) -> Result<Vec<JobDataRecord>, PersonaError> {
        self.load(job_id).await?;
        self.store.job_data(job_id).await
    }

    /// Finishes the fan-out of a job left `pending`. Returns `true` if the job moved
    /// to `processing`.
    pub async fn resume_pending(&self, job_id: JobId) -> Result<bool, PersonaError> {
        let _guard = self.locks.lock(job_id).await;
        let mut job = self.load(job_id).await?;
        if job.status != JobStatus::Pending {
            return Ok(false);
        }
        let resumed = self.fan_out(&mut job).await?;
        if resumed {
            info!(job_id = %job_id, "pending job resumed");
        }
        Ok(resumed)
    }

    /// Fails the pending sources of a processing job older than the job timeout,
    /// except sources whose descriptor is currently leased. Returns the sources
    /// failed and the job's resulting status.
    pub async fn expire_stuck_sources(
        &self,
        job_id: JobId,
    ) -> Result<Option<(Vec<Source>, JobStatus)>, PersonaError> {
        let _guard = self.locks.lock(job_id).await;
        let mut job = self.load(job_id).await?;
        let now = self.clock.now();
        if job.status != JobStatus::Processing
            || clock::elapsed(job.created_at, now) < self.config.job_timeout
        {
            return Ok(None);
        }

        let mut expired = Vec::new();
        for source in job.pending_sources() {
            let descriptor = self.queue.find(job_id, source).await?;
            if descriptor.as_ref().is_some_and(|d| d.is_leased(now)) {
                continue;
            }
            job.record_error(
                source,
                format!("timed out after {}s", self.config.job_timeout.as_secs()),
            );
            job.record_outcome(source, SourceOutcome::Failed, now);
            expired.push(source);
        }
        if expired.is_empty() {
            return Ok(None);
        }

        job.settle(self.config.completion_policy, now)?;
        self.persist(&job).await?;
        for source in &expired {
            self.ack_source(job_id, *source).await?;
        }
        warn!(job_id = %job_id, sources = ?expired, status = %job.status, "stuck sources expired");
        Ok(Some((expired, job.status)))
    }

    async fn load(&self, job_id: JobId) -> Result<Job, PersonaError> {
        match self.store.get_job(job_id).await? {
            Some(job) => Ok(job),
            None => {
                self.locks.forget(job_id);
                Err(PersonaError::NotFound(job_id))
            }
        }
    }

    async fn persist(&self, job: &Job) -> Result<(), PersonaError> {
        self.store.save_job(job).await?;
        if job.status.is_terminal() {
            info!(
                job_id = %job.id,
                status = %job.status,
                failure_reason = job.failure_reason.as_deref().unwrap_or(""),
                "job finished"
            );
            self.cache_terminal(job).await;
            self.locks.forget(job.id);
        }
        Ok(())
    }

    async fn ack_source(&self, job_id: JobId, source: Source) -> Result<(), PersonaError> {
        if let Some(descriptor) = self.queue.find(job_id, source).await? {
            self.queue.ack(descriptor.id).await?;
        }
        Ok(())
    }

    /// Best effort: the store stays the source of truth.
    async fn cache_terminal(&self, job: &Job) {
        let value = match serde_json::to_value(job) {
            Ok(value) => value,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "job snapshot did not serialize");
                return;
            }
        };
        if let Err(e) = self.cache.put(&cache_key(job.id), value, None).await {
            warn!(job_id = %job.id, error = %e, "caching job snapshot failed");
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.len()
    }
}

fn cache_key(job_id: JobId) -> String {
    format!("job:{job_id}")
}
