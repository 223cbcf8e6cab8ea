//! Task descriptor: one queued unit of collector work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{JobId, TaskId};
use super::source::Source;

/// A queued request to run one collector for one job.
///
/// `job_id` is a reference, not ownership: the job lives in the job store.
/// `attempt_count` only moves on a reported failure, never on lease, so an in-flight
/// task is distinguishable from a retried one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub job_id: JobId,
    pub source: Source,
    pub payload: serde_json::Value,

    pub attempt_count: u32,
    pub max_attempts: u32,

    /// Earliest time the descriptor may be leased. While leased this is the lease
    /// expiry; after a failure it is the backoff deadline.
    pub visible_at: DateTime<Utc>,

    /// Set by a lease, cleared by a requeue.
    #[serde(default)]
    pub leased: bool,

    pub enqueued_at: DateTime<Utc>,
}

impl TaskDescriptor {
    pub fn new(
        id: TaskId,
        job_id: JobId,
        source: Source,
        payload: serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_id,
            source,
            payload,
            attempt_count: 0,
            max_attempts,
            visible_at: now,
            leased: false,
            enqueued_at: now,
        }
    }

    /// Held by a worker whose lease has not yet expired.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.leased && self.visible_at > now
    }

    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.visible_at <= now
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Counts one failed attempt. A permanent failure consumes every remaining attempt.
    /// Never exceeds `max_attempts`.
    pub fn record_failure(&mut self, permanent: bool) {
        self.attempt_count = if permanent {
            self.max_attempts
        } else {
            (self.attempt_count + 1).min(self.max_attempts)
        };
    }
}
