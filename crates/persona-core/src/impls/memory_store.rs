//! InMemoryJobStore - development / test job store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Job, JobDataRecord, JobId, JobStatus, PersonaError, Source};
use crate::ports::JobStore;

/// Jobs and data records behind separate locks, so data writes for distinct
/// `(job_id, source)` keys never wait on job updates.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    data: RwLock<HashMap<(JobId, Source), JobDataRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: &Job) -> Result<(), PersonaError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(PersonaError::Internal(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn save_job(&self, job: &Job) -> Result<(), PersonaError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(PersonaError::NotFound(job.id)),
        }
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, PersonaError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Job>, PersonaError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.created_at);
        Ok(matching)
    }

    async fn put_data(&self, record: JobDataRecord) -> Result<(), PersonaError> {
        self.data
            .write()
            .await
            .insert((record.job_id, record.source), record);
        Ok(())
    }

    async fn job_data(&self, job_id: JobId) -> Result<Vec<JobDataRecord>, PersonaError> {
        let data = self.data.read().await;
        let mut records: Vec<JobDataRecord> = data
            .values()
            .filter(|record| record.job_id == job_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.source);
        Ok(records)
    }

    async fn ping(&self) -> Result<(), PersonaError> {
        Ok(())
    }
}
