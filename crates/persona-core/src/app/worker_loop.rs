//! Worker loop: lease -> run collector -> report.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::orchestrator::{JobOrchestrator, ReportResult};
use crate::collector::CollectorRegistry;
use crate::domain::{CollectorOutcome, PersonaError, TaskDescriptor};
use crate::ports::TaskQueue;

/// Everything a worker needs. Shared by every worker of a pool.
pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    registry: Arc<CollectorRegistry>,
    orchestrator: Arc<JobOrchestrator>,
    wake: Arc<Notify>,
    task_timeout: Duration,
    lease_batch_size: usize,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        registry: Arc<CollectorRegistry>,
        orchestrator: Arc<JobOrchestrator>,
        wake: Arc<Notify>,
    ) -> Self {
        let config = orchestrator.config();
        Self {
            task_timeout: config.task_timeout,
            lease_batch_size: config.lease_batch_size,
            poll_interval: config.poll_interval,
            queue,
            registry,
            orchestrator,
            wake,
        }
    }

    /// Leases one batch and runs it. Returns how many descriptors were processed.
    pub async fn tick(&self) -> Result<usize, PersonaError> {
        let batch = self.queue.lease(self.lease_batch_size).await?;
        let count = batch.len();
        for descriptor in batch {
            if let Err(e) = self.process(descriptor).await {
                error!(error = %e, "reporting outcome failed; descriptor left for redelivery");
            }
        }
        Ok(count)
    }

    /// Runs the collector for one leased descriptor and reports its outcome.
    pub async fn process(&self, descriptor: TaskDescriptor) -> Result<ReportResult, PersonaError> {
        debug!(
            task_id = %descriptor.id,
            job_id = %descriptor.job_id,
            source = %descriptor.source,
            attempt = descriptor.attempt_count + 1,
            "running collector"
        );
        let outcome = self.execute(&descriptor).await;
        self.orchestrator
            .report_outcome(descriptor.job_id, descriptor.source, outcome)
            .await
    }

    /// A timeout is transient. A panic or a missing collector is permanent.
    async fn execute(&self, descriptor: &TaskDescriptor) -> CollectorOutcome {
        let Some(collector) = self.registry.get(descriptor.source) else {
            return CollectorOutcome::permanent(format!(
                "no collector registered for source {}",
                descriptor.source
            ));
        };

        let payload = descriptor.payload.clone();
        let mut handle = tokio::spawn(async move { collector.collect_dyn(payload).await });

        match tokio::time::timeout(self.task_timeout, &mut handle).await {
            Ok(Ok(result)) => result.into(),
            Ok(Err(join_err)) => {
                error!(task_id = %descriptor.id, error = %join_err, "collector panicked");
                CollectorOutcome::permanent(format!("collector aborted: {join_err}"))
            }
            Err(_) => {
                handle.abort();
                warn!(
                    task_id = %descriptor.id,
                    source = %descriptor.source,
                    timeout_secs = self.task_timeout.as_secs(),
                    "collector timed out"
                );
                CollectorOutcome::transient(format!(
                    "collector timed out after {}s",
                    self.task_timeout.as_secs()
                ))
            }
        }
    }

    async fn run(self: Arc<Self>, worker_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        info!(worker_id, "worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let processed = match self.tick().await {
                Ok(n) => n,
                Err(e) => {
                    error!(worker_id, error = %e, "lease failed");
                    0
                }
            };
            if processed > 0 {
                continue;
            }

            // Idle: wait for new work, a shutdown, or the next poll.
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!(worker_id, "worker stopped");
    }
}

/// Worker pool handle.
/// - `request_shutdown()` stops every worker after its current descriptor
/// - `shutdown_and_join()` also waits for them
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(n: usize, worker: Arc<Worker>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = (0..n)
            .map(|worker_id| {
                let worker = Arc::clone(&worker);
                let rx = shutdown_rx.clone();
                tokio::spawn(worker.run(worker_id, rx))
            })
            .collect();
        Self { shutdown_tx, joins }
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    pub fn request_shutdown(&self) {
        // Receivers may already be gone.
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}
