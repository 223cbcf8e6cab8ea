//! In-memory task queue.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{JobId, PersonaError, Source, TaskDescriptor, TaskId};
use crate::ports::clock::{self, Clock};
use crate::ports::{QueueStats, TaskQueue};

/// Queue state.
///
/// `descriptors` is the single source of truth. `visibility` and `by_source` are
/// indexes over it and are updated in the same critical section.
#[derive(Default)]
struct QueueState {
    descriptors: HashMap<TaskId, TaskDescriptor>,

    /// Ordered by `visible_at`, so a lease scan stops at the first future entry.
    visibility: BTreeSet<(DateTime<Utc>, TaskId)>,

    by_source: HashMap<(JobId, Source), TaskId>,
}

impl QueueState {
    fn insert(&mut self, descriptor: TaskDescriptor) {
        self.visibility.insert((descriptor.visible_at, descriptor.id));
        self.by_source
            .insert((descriptor.job_id, descriptor.source), descriptor.id);
        self.descriptors.insert(descriptor.id, descriptor);
    }

    fn remove(&mut self, id: TaskId) -> Option<TaskDescriptor> {
        let descriptor = self.descriptors.remove(&id)?;
        self.visibility.remove(&(descriptor.visible_at, id));
        self.by_source.remove(&(descriptor.job_id, descriptor.source));
        Some(descriptor)
    }

    /// Moves a descriptor to a new `visible_at`, keeping the index in sync.
    fn reschedule(&mut self, id: TaskId, visible_at: DateTime<Utc>, leased: bool) -> bool {
        let Some(descriptor) = self.descriptors.get_mut(&id) else {
            return false;
        };
        self.visibility.remove(&(descriptor.visible_at, id));
        descriptor.visible_at = visible_at;
        descriptor.leased = leased;
        self.visibility.insert((visible_at, id));
        true
    }

    fn stats(&self, now: DateTime<Utc>) -> QueueStats {
        let mut stats = QueueStats {
            total: self.descriptors.len(),
            ..QueueStats::default()
        };
        for descriptor in self.descriptors.values() {
            if descriptor.is_leased(now) {
                stats.leased += 1;
            } else {
                stats.pending += 1;
                if descriptor.is_visible(now) {
                    stats.ready += 1;
                }
            }
        }
        stats
    }
}

/// Single-process queue. Lease expiry is driven entirely by the injected clock.
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    clock: Arc<dyn Clock>,
    lease_duration: Duration,
}

impl InMemoryTaskQueue {
    pub fn new(clock: Arc<dyn Clock>, lease_duration: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            clock,
            lease_duration,
        }
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, mut descriptor: TaskDescriptor) -> Result<TaskId, PersonaError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.by_source.get(&(descriptor.job_id, descriptor.source)) {
            debug!(
                job_id = %descriptor.job_id,
                source = %descriptor.source,
                task_id = %existing,
                "descriptor already queued"
            );
            return Ok(*existing);
        }

        let now = self.clock.now();
        descriptor.visible_at = now;
        descriptor.leased = false;
        let id = descriptor.id;
        state.insert(descriptor);
        Ok(id)
    }

    async fn lease(&self, max_count: usize) -> Result<Vec<TaskDescriptor>, PersonaError> {
        let now = self.clock.now();
        let expires_at = clock::add(now, self.lease_duration);

        let mut state = self.state.lock().await;
        let due: Vec<TaskId> = state
            .visibility
            .iter()
            .take_while(|(visible_at, _)| *visible_at <= now)
            .take(max_count)
            .map(|(_, id)| *id)
            .collect();

        let mut leased = Vec::with_capacity(due.len());
        for id in due {
            if state.reschedule(id, expires_at, true) {
                if let Some(descriptor) = state.descriptors.get(&id) {
                    leased.push(descriptor.clone());
                }
            }
        }
        Ok(leased)
    }

    async fn ack(&self, id: TaskId) -> Result<(), PersonaError> {
        let mut state = self.state.lock().await;
        if state.remove(id).is_none() {
            debug!(task_id = %id, "ack for unknown descriptor");
        }
        Ok(())
    }

    async fn requeue(&self, id: TaskId, delay: Duration) -> Result<(), PersonaError> {
        let visible_at = clock::add(self.clock.now(), delay);
        let mut state = self.state.lock().await;
        if state.reschedule(id, visible_at, false) {
            Ok(())
        } else {
            Err(PersonaError::Internal(format!("requeue of unknown descriptor {id}")))
        }
    }

    async fn record_failure(
        &self,
        id: TaskId,
        permanent: bool,
    ) -> Result<TaskDescriptor, PersonaError> {
        let mut state = self.state.lock().await;
        let descriptor = state
            .descriptors
            .get_mut(&id)
            .ok_or_else(|| PersonaError::Internal(format!("unknown descriptor {id}")))?;
        descriptor.record_failure(permanent);
        Ok(descriptor.clone())
    }

    async fn find(
        &self,
        job_id: JobId,
        source: Source,
    ) -> Result<Option<TaskDescriptor>, PersonaError> {
        let state = self.state.lock().await;
        Ok(state
            .by_source
            .get(&(job_id, source))
            .and_then(|id| state.descriptors.get(id))
            .cloned())
    }

    async fn stats(&self) -> Result<QueueStats, PersonaError> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        Ok(state.stats(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use ulid::Ulid;

    const LEASE: Duration = Duration::from_secs(300);

    fn setup() -> (Arc<FixedClock>, InMemoryTaskQueue) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let queue = InMemoryTaskQueue::new(clock.clone(), LEASE);
        (clock, queue)
    }

    fn descriptor(job_id: JobId, source: Source) -> TaskDescriptor {
        TaskDescriptor::new(
            TaskId::from_ulid(Ulid::new()),
            job_id,
            source,
            serde_json::json!({}),
            3,
            Utc::now(),
        )
    }

    fn new_job() -> JobId {
        JobId::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn enqueue_and_stats() {
        let (_, queue) = setup();
        queue.enqueue(descriptor(new_job(), Source::Website)).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                pending: 1,
                leased: 0,
                ready: 1,
                total: 1
            }
        );
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_source() {
        let (_, queue) = setup();
        let job = new_job();
        let first = queue.enqueue(descriptor(job, Source::Website)).await.unwrap();
        let second = queue.enqueue(descriptor(job, Source::Website)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(queue.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn lease_hides_descriptor_without_counting_an_attempt() {
        let (_, queue) = setup();
        queue.enqueue(descriptor(new_job(), Source::Website)).await.unwrap();

        let leased = queue.lease(10).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].attempt_count, 0);
        assert!(leased[0].leased);

        assert!(queue.lease(10).await.unwrap().is_empty());
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.leased, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn lease_respects_max_count() {
        let (_, queue) = setup();
        let job = new_job();
        queue.enqueue(descriptor(job, Source::Website)).await.unwrap();
        queue.enqueue(descriptor(job, Source::Reviews)).await.unwrap();

        assert_eq!(queue.lease(1).await.unwrap().len(), 1);
        assert_eq!(queue.lease(1).await.unwrap().len(), 1);
        assert!(queue.lease(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_lease_makes_descriptor_leasable_again() {
        let (clock, queue) = setup();
        let id = queue.enqueue(descriptor(new_job(), Source::Website)).await.unwrap();

        assert_eq!(queue.lease(1).await.unwrap()[0].id, id);

        clock.advance(LEASE - Duration::from_secs(1));
        assert!(queue.lease(1).await.unwrap().is_empty());

        clock.advance(Duration::from_secs(2));
        let again = queue.lease(1).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, id);
    }

    #[tokio::test]
    async fn ack_removes_permanently() {
        let (clock, queue) = setup();
        let job = new_job();
        let id = queue.enqueue(descriptor(job, Source::Website)).await.unwrap();
        queue.lease(1).await.unwrap();
        queue.ack(id).await.unwrap();

        clock.advance(LEASE * 2);
        assert!(queue.lease(1).await.unwrap().is_empty());
        assert!(queue.find(job, Source::Website).await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().total, 0);

        queue.ack(id).await.unwrap();
    }

    #[tokio::test]
    async fn requeue_delays_visibility_and_releases_lease() {
        let (clock, queue) = setup();
        let id = queue.enqueue(descriptor(new_job(), Source::Website)).await.unwrap();
        queue.lease(1).await.unwrap();

        queue.requeue(id, Duration::from_secs(30)).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.ready, 0);
        assert!(queue.lease(1).await.unwrap().is_empty());

        clock.advance(Duration::from_secs(30));
        assert_eq!(queue.lease(1).await.unwrap()[0].id, id);
    }

    #[tokio::test]
    async fn requeue_of_unknown_descriptor_fails() {
        let (_, queue) = setup();
        let err = queue
            .requeue(TaskId::from_ulid(Ulid::new()), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PersonaError::Internal(_)));
    }

    #[tokio::test]
    async fn record_failure_updates_attempts() {
        let (_, queue) = setup();
        let job = new_job();
        let id = queue.enqueue(descriptor(job, Source::Reviews)).await.unwrap();

        let updated = queue.record_failure(id, false).await.unwrap();
        assert_eq!(updated.attempt_count, 1);

        let updated = queue.record_failure(id, true).await.unwrap();
        assert_eq!(updated.attempt_count, 3);
        assert_eq!(
            queue.find(job, Source::Reviews).await.unwrap().unwrap().attempt_count,
            3
        );
    }
}
