//! In-memory adapters for the store and cache ports.
//!
//! Used by tests and single-process deployments. Production deployments plug their
//! own `JobStore` / `Cache` implementations into `AppBuilder`.

pub mod memory_cache;
pub mod memory_store;

pub use self::memory_cache::InMemoryCache;
pub use self::memory_store::InMemoryJobStore;
