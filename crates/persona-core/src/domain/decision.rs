//! Decision model: what to do with a descriptor after a failed attempt.

use std::time::Duration;

use super::errors::CollectorError;
use super::task::TaskDescriptor;
use crate::queue::RetryPolicy;

/// The next action for a failed descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Redeliver after `delay`.
    Retry { delay: Duration },

    /// Stop retrying; the source is failed.
    GiveUp { reason: String },
}

/// Decides the next action from a descriptor whose attempt count already includes
/// the failure being handled.
///
/// Deciders are pure: applying the decision (requeue or ack) is the orchestrator's job.
pub trait Decider: Send + Sync {
    fn decide(&self, descriptor: &TaskDescriptor, error: &CollectorError) -> Decision;
}

/// Attempt-budget decider with exponential backoff.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, descriptor: &TaskDescriptor, error: &CollectorError) -> Decision {
        if error.is_permanent() {
            return Decision::GiveUp {
                reason: format!("permanent failure: {}", error.message),
            };
        }
        if descriptor.attempts_exhausted() {
            return Decision::GiveUp {
                reason: format!(
                    "max attempts reached ({}/{}): {}",
                    descriptor.attempt_count, descriptor.max_attempts, error.message
                ),
            };
        }
        Decision::Retry {
            delay: self.retry_policy.next_delay(descriptor.attempt_count),
        }
    }
}
