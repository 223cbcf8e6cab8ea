//! Test doubles shared by the app tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::domain::{JobId, PersonaError, Source, TaskDescriptor, TaskId};
use crate::ports::{FixedClock, QueueStats, TaskQueue};
use crate::queue::InMemoryTaskQueue;

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ))
}

/// In-memory queue whose next `failures` enqueues fail as unavailable.
pub struct FlakyQueue {
    inner: InMemoryTaskQueue,
    failures: AtomicUsize,
}

impl FlakyQueue {
    pub fn new(inner: InMemoryTaskQueue, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskQueue for FlakyQueue {
    async fn enqueue(&self, descriptor: TaskDescriptor) -> Result<TaskId, PersonaError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PersonaError::unavailable("queue", "connection refused"));
        }
        self.inner.enqueue(descriptor).await
    }

    async fn lease(&self, max_count: usize) -> Result<Vec<TaskDescriptor>, PersonaError> {
        self.inner.lease(max_count).await
    }

    async fn ack(&self, id: TaskId) -> Result<(), PersonaError> {
        self.inner.ack(id).await
    }

    async fn requeue(&self, id: TaskId, delay: Duration) -> Result<(), PersonaError> {
        self.inner.requeue(id, delay).await
    }

    async fn record_failure(
        &self,
        id: TaskId,
        permanent: bool,
    ) -> Result<TaskDescriptor, PersonaError> {
        self.inner.record_failure(id, permanent).await
    }

    async fn find(
        &self,
        job_id: JobId,
        source: Source,
    ) -> Result<Option<TaskDescriptor>, PersonaError> {
        self.inner.find(job_id, source).await
    }

    async fn stats(&self) -> Result<QueueStats, PersonaError> {
        self.inner.stats().await
    }
}
