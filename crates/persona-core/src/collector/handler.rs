//! Collector traits.
//!
//! - `Collector<P>`: what adapters implement, typed by payload.
//! - `DynCollector`: object-safe form stored in the registry and driven by workers.
//! - `TypedCollector<P, C>`: decodes the JSON payload and forwards to `Collector<P>`.

use std::marker::PhantomData;

use async_trait::async_trait;

use super::payload::CollectorPayload;
use crate::domain::{CollectorError, Source};

#[async_trait]
pub trait Collector<P: CollectorPayload>: Send + Sync {
    async fn collect(&self, payload: P) -> Result<serde_json::Value, CollectorError>;
}

#[async_trait]
pub trait DynCollector: Send + Sync {
    async fn collect_dyn(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, CollectorError>;

    fn source(&self) -> Source;
}

pub struct TypedCollector<P: CollectorPayload, C: Collector<P>> {
    collector: C,
    _marker: PhantomData<fn() -> P>,
}

impl<P: CollectorPayload, C: Collector<P>> TypedCollector<P, C> {
    pub fn new(collector: C) -> Self {
        Self {
            collector,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P: CollectorPayload, C: Collector<P>> DynCollector for TypedCollector<P, C> {
    async fn collect_dyn(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, CollectorError> {
        // A payload that does not decode will never decode.
        let payload: P = serde_json::from_value(payload).map_err(|e| {
            CollectorError::permanent(format!("decode {} payload: {e}", P::SOURCE))
        })?;
        self.collector.collect(payload).await
    }

    fn source(&self) -> Source {
        P::SOURCE
    }
}

/// A collector backed by a plain function. Handy for stubs and for sources whose
/// work is synchronous.
pub struct FnCollector<F> {
    source: Source,
    f: F,
}

impl<F> FnCollector<F>
where
    F: Fn(serde_json::Value) -> Result<serde_json::Value, CollectorError> + Send + Sync,
{
    pub fn new(source: Source, f: F) -> Self {
        Self { source, f }
    }
}

#[async_trait]
impl<F> DynCollector for FnCollector<F>
where
    F: Fn(serde_json::Value) -> Result<serde_json::Value, CollectorError> + Send + Sync,
{
    async fn collect_dyn(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, CollectorError> {
        (self.f)(payload)
    }

    fn source(&self) -> Source {
        self.source
    }
}
