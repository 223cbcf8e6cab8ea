//! Ports - seams to the outside world.
//!
//! Each trait hides one external dependency (store, queue, cache, time, ids) so the
//! orchestration logic can be exercised against in-memory adapters.

pub mod cache;
pub mod clock;
pub mod id_generator;
pub mod job_store;
pub mod task_queue;

pub use self::cache::Cache;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::task_queue::{QueueStats, TaskQueue};
