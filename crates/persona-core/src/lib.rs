//! persona-core
//!
//! Orchestration engine for persona research jobs: a job fans out into one
//! descriptor per data source, workers run the collectors, and the orchestrator
//! folds each outcome into the job until it completes or fails.
//!
//! # Modules
//! - **domain**: jobs, sources, descriptors, outcomes, errors, retry decisions
//! - **ports**: seams to storage, queueing, caching, time, ids
//! - **queue**: lease-based in-memory task queue and retry policy
//! - **impls**: in-memory job store and cache
//! - **collector**: typed collectors, the registry, HTTP collectors
//! - **app**: orchestrator, worker pool, retry sweeper, health, builder
//! - **config**: engine tuning

pub mod app;
pub mod collector;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{App, AppBuilder};
pub use config::EngineConfig;
