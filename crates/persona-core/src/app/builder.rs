//! AppBuilder - wiring and start-up validation.
//!
//! `build()` fails fast: an invalid config or an enabled source without a collector
//! is reported at start-up, not when the first descriptor for it is leased.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Notify;

use super::health::{CacheProbe, ConfigProbe, HealthAggregator, HealthProbe, QueueProbe, StoreProbe};
use super::orchestrator::JobOrchestrator;
use super::sweeper::RetrySweeper;
use super::worker_loop::{Worker, WorkerPool};
use crate::collector::{Collector, CollectorPayload, CollectorRegistry, DynCollector, RegistryError};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Decider, DefaultDecider, Source};
use crate::impls::{InMemoryCache, InMemoryJobStore};
use crate::ports::{Cache, Clock, IdGenerator, JobStore, SystemClock, TaskQueue, UlidGenerator};
use crate::queue::InMemoryTaskQueue;

/// # Example
/// ```ignore
/// let app = AppBuilder::new(EngineConfig::default())
///     .register::<WebsitePayload, _>(page.clone())?
///     .register::<ReviewsPayload, _>(page)?
///     .build()?;
/// let workers = app.spawn_workers();
/// ```
///
/// Unset ports default to the in-memory adapters and the system clock.
pub struct AppBuilder {
    config: EngineConfig,
    registry: CollectorRegistry,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn JobStore>>,
    queue: Option<Arc<dyn TaskQueue>>,
    cache: Option<Arc<dyn Cache>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
    config_probe: Option<ConfigProbe>,
    probes: Vec<Arc<dyn HealthProbe>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("no collector registered for enabled sources: {0:?}")]
    MissingCollectors(Vec<Source>),

    #[error("health probe name registered twice: {0}")]
    DuplicateProbe(&'static str),
}

impl AppBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: CollectorRegistry::new(),
            clock: None,
            store: None,
            queue: None,
            cache: None,
            ids: None,
            decider: None,
            config_probe: None,
            probes: Vec::new(),
        }
    }

    pub fn register<P, C>(mut self, collector: C) -> Result<Self, RegistryError>
    where
        P: CollectorPayload,
        C: Collector<P> + 'static,
    {
        self.registry.register::<P, C>(collector)?;
        Ok(self)
    }

    pub fn register_dyn(mut self, collector: Arc<dyn DynCollector>) -> Result<Self, RegistryError> {
        self.registry.register_dyn(collector)?;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Replaces the default config probe, e.g. to add deployment settings.
    pub fn with_config_probe(mut self, probe: ConfigProbe) -> Self {
        self.config_probe = Some(probe);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let registered = self.registry.registered_sources();
        let missing: Vec<Source> = self
            .config
            .enabled_sources()
            .into_iter()
            .filter(|source| !registered.contains(source))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingCollectors(missing));
        }

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new()));
        let queue = self.queue.unwrap_or_else(|| {
            Arc::new(InMemoryTaskQueue::new(clock.clone(), config.lease_duration))
        });
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::new(clock.clone())));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(config.retry_policy.clone())));
        let wake = Arc::new(Notify::new());

        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            queue.clone(),
            cache.clone(),
            clock.clone(),
            ids,
            decider,
            config.clone(),
            wake.clone(),
        ));
        let sweeper = Arc::new(RetrySweeper::new(
            orchestrator.clone(),
            store.clone(),
            clock.clone(),
            wake.clone(),
        ));

        let config_probe = self
            .config_probe
            .unwrap_or_else(|| ConfigProbe::new(config.clone()));
        let mut probes: Vec<Arc<dyn HealthProbe>> = vec![
            Arc::new(StoreProbe(store.clone())),
            Arc::new(QueueProbe(queue.clone())),
            Arc::new(CacheProbe(cache)),
            Arc::new(config_probe),
        ];
        probes.extend(self.probes);
        let mut names = BTreeSet::new();
        if let Some(dup) = probes.iter().map(|p| p.name()).find(|name| !names.insert(*name)) {
            return Err(BuildError::DuplicateProbe(dup));
        }
        let health = Arc::new(HealthAggregator::new(probes, config.probe_timeout, clock.clone()));

        let worker = Arc::new(Worker::new(
            queue.clone(),
            Arc::new(self.registry),
            orchestrator.clone(),
            wake,
        ));

        Ok(App {
            config,
            clock,
            store,
            queue,
            orchestrator,
            sweeper,
            health,
            worker,
        })
    }
}

/// The wired engine. Cheap to share behind an `Arc`.
pub struct App {
    pub config: EngineConfig,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub sweeper: Arc<RetrySweeper>,
    pub health: Arc<HealthAggregator>,
    worker: Arc<Worker>,
}

impl App {
    pub fn worker(&self) -> Arc<Worker> {
        Arc::clone(&self.worker)
    }

    /// Spawns `config.worker_count` workers.
    pub fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(self.config.worker_count, self.worker())
    }
}
