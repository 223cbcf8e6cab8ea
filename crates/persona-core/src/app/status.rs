//! Client-facing job status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobId, JobStatus, Source, SourceOutcome};

/// What `GET /jobs/{id}/status` returns. Per-source error messages stay internal;
/// clients only see which sources failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub sources: BTreeMap<Source, SourceOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress(),
            created_at: job.created_at,
            completed_at: job.completed_at,
            sources: job.source_outcomes.clone(),
            failure_reason: job.failure_reason.clone(),
        }
    }
}
