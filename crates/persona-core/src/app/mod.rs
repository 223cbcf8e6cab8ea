//! App - application layer.
//!
//! Combines the ports into the engine.
//!
//! # Components
//! - **AppBuilder**: wiring and start-up validation
//! - **JobOrchestrator**: job creation, outcome folding, completion
//! - **WorkerPool**: lease -> collect -> report
//! - **RetrySweeper**: resumes stalled fan-outs, expires stuck jobs
//! - **HealthAggregator**: composite health

pub mod builder;
pub mod health;
pub mod orchestrator;
pub mod status;
pub mod sweeper;
pub mod worker_loop;

#[cfg(test)]
pub(crate) mod testing;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::health::{
    CacheProbe, CompositeHealth, ConfigProbe, HealthAggregator, HealthProbe, HealthStatus,
    ProbeReport, QueueProbe, StoreProbe,
};
pub use self::orchestrator::{JobOrchestrator, ReportResult};
pub use self::status::JobStatusView;
pub use self::sweeper::{ExpiredJob, RetrySweeper, SweepReport};
pub use self::worker_loop::{Worker, WorkerPool};
