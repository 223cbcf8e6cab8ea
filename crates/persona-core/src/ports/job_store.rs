//! JobStore port - the source of truth for jobs and collected data.
//!
//! Jobs are keyed by id; collected data by `(job_id, source)`. Writes to distinct data
//! keys need no coordination. Read-modify-write of a job is serialized by the
//! orchestrator's per-job lock.

use async_trait::async_trait;

use crate::domain::{Job, JobDataRecord, JobId, JobStatus, PersonaError};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job. Fails if the id already exists.
    async fn insert_job(&self, job: &Job) -> Result<(), PersonaError>;

    /// Replaces an existing job record.
    async fn save_job(&self, job: &Job) -> Result<(), PersonaError>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, PersonaError>;

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, PersonaError>;

    /// Writes collector output. Last write for a key wins.
    async fn put_data(&self, record: JobDataRecord) -> Result<(), PersonaError>;

    async fn job_data(&self, job_id: JobId) -> Result<Vec<JobDataRecord>, PersonaError>;

    /// Reachability check for health probes.
    async fn ping(&self) -> Result<(), PersonaError>;
}
