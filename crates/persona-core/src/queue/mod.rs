//! Queue module: retry policy and the in-memory task queue.

mod memory;
mod retry;

pub use memory::InMemoryTaskQueue;
pub use retry::RetryPolicy;

pub(crate) use retry::secs;
