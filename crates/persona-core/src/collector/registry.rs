//! CollectorRegistry - one collector per source.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::handler::{Collector, DynCollector, TypedCollector};
use super::payload::CollectorPayload;
use crate::domain::Source;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a collector for source '{0}' is already registered")]
    AlreadyRegistered(Source),
}

/// Built during start-up, read-only afterwards.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: BTreeMap<Source, Arc<dyn DynCollector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P, C>(&mut self, collector: C) -> Result<(), RegistryError>
    where
        P: CollectorPayload,
        C: Collector<P> + 'static,
    {
        self.register_dyn(Arc::new(TypedCollector::<P, C>::new(collector)))
    }

    pub fn register_dyn(&mut self, collector: Arc<dyn DynCollector>) -> Result<(), RegistryError> {
        let source = collector.source();
        if self.collectors.contains_key(&source) {
            return Err(RegistryError::AlreadyRegistered(source));
        }
        self.collectors.insert(source, collector);
        Ok(())
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn DynCollector>> {
        self.collectors.get(&source).cloned()
    }

    pub fn registered_sources(&self) -> Vec<Source> {
        self.collectors.keys().copied().collect()
    }
}
