//! TaskQueue port - durable at-least-once delivery of task descriptors.
//!
//! A descriptor disappears only through `ack`. A worker that crashes mid-task simply
//! lets its lease run out, and the descriptor becomes leasable again.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{JobId, PersonaError, Source, TaskDescriptor, TaskId};

/// Counts derived from queue state on every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Not currently held by a worker (ready now or waiting out a backoff).
    pub pending: usize,
    /// Held by a worker whose lease has not expired.
    pub leased: usize,
    /// Leasable right now.
    pub ready: usize,
    pub total: usize,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Adds a descriptor, visible immediately.
    ///
    /// At most one live descriptor exists per `(job_id, source)`: enqueueing a second
    /// one returns the id of the existing descriptor instead.
    async fn enqueue(&self, descriptor: TaskDescriptor) -> Result<TaskId, PersonaError>;

    /// Leases up to `max_count` visible descriptors, hiding each for the lease duration.
    async fn lease(&self, max_count: usize) -> Result<Vec<TaskDescriptor>, PersonaError>;

    /// Removes a descriptor for good. Unknown ids are ignored.
    async fn ack(&self, id: TaskId) -> Result<(), PersonaError>;

    /// Makes a descriptor visible again after `delay` and releases its lease.
    async fn requeue(&self, id: TaskId, delay: Duration) -> Result<(), PersonaError>;

    /// Counts a failed attempt and returns the updated descriptor.
    async fn record_failure(
        &self,
        id: TaskId,
        permanent: bool,
    ) -> Result<TaskDescriptor, PersonaError>;

    /// The live descriptor for a job's source, if any.
    async fn find(
        &self,
        job_id: JobId,
        source: Source,
    ) -> Result<Option<TaskDescriptor>, PersonaError>;

    async fn stats(&self) -> Result<QueueStats, PersonaError>;
}
