//! Engine configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CompletionPolicy, Source};
use crate::queue::{RetryPolicy, secs};

/// Tunables for the orchestrator, the queue and the background loops.
///
/// Every field has a default, so a partial JSON/TOML document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts per descriptor before its source is marked failed.
    pub max_attempts: u32,
    pub retry_policy: RetryPolicy,
    pub completion_policy: CompletionPolicy,

    /// How long a leased descriptor stays hidden from other workers.
    #[serde(with = "secs")]
    pub lease_duration: Duration,

    /// Per-run collector timeout. A whole leased batch runs back to back, so
    /// `lease_batch_size * task_timeout` must be shorter than the lease.
    #[serde(with = "secs")]
    pub task_timeout: Duration,

    /// Processing jobs older than this are swept.
    #[serde(with = "secs")]
    pub job_timeout: Duration,

    /// Immediate attempts per descriptor at job creation before leaving it to the sweeper.
    pub enqueue_attempts: u32,

    pub worker_count: usize,
    pub lease_batch_size: usize,

    /// How long an idle worker sleeps before polling the queue again.
    #[serde(with = "secs")]
    pub poll_interval: Duration,

    /// Period of the background sweep.
    #[serde(with = "secs")]
    pub sweep_interval: Duration,

    #[serde(with = "secs")]
    pub probe_timeout: Duration,

    /// Sources recorded as skipped instead of collected.
    pub disabled_sources: BTreeSet<Source>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_policy: RetryPolicy::default(),
            completion_policy: CompletionPolicy::default(),
            lease_duration: Duration::from_secs(5 * 60),
            task_timeout: Duration::from_secs(2 * 60),
            job_timeout: Duration::from_secs(30 * 60),
            enqueue_attempts: 3,
            worker_count: 4,
            lease_batch_size: 1,
            poll_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(3),
            disabled_sources: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("task_timeout ({task_timeout:?}) must be shorter than lease_duration ({lease_duration:?})")]
    TimeoutExceedsLease {
        task_timeout: Duration,
        lease_duration: Duration,
    },

    #[error(
        "lease_batch_size ({batch}) * task_timeout ({task_timeout:?}) must be shorter than lease_duration ({lease_duration:?})"
    )]
    BatchExceedsLease {
        batch: usize,
        task_timeout: Duration,
        lease_duration: Duration,
    },

    #[error("source {0} cannot be disabled")]
    RequiredSourceDisabled(Source),
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if self.enqueue_attempts == 0 {
            return Err(ConfigError::Zero("enqueue_attempts"));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Zero("worker_count"));
        }
        if self.lease_batch_size == 0 {
            return Err(ConfigError::Zero("lease_batch_size"));
        }
        if self.task_timeout >= self.lease_duration {
            return Err(ConfigError::TimeoutExceedsLease {
                task_timeout: self.task_timeout,
                lease_duration: self.lease_duration,
            });
        }
        // The last descriptor of a batch must still be leased when its run times out.
        let batch_budget = u32::try_from(self.lease_batch_size)
            .ok()
            .and_then(|n| self.task_timeout.checked_mul(n));
        if batch_budget.is_none_or(|budget| budget >= self.lease_duration) {
            return Err(ConfigError::BatchExceedsLease {
                batch: self.lease_batch_size,
                task_timeout: self.task_timeout,
                lease_duration: self.lease_duration,
            });
        }
        // Website is always expected.
        if self.disabled_sources.contains(&Source::Website) {
            return Err(ConfigError::RequiredSourceDisabled(Source::Website));
        }
        Ok(())
    }

    pub fn is_enabled(&self, source: Source) -> bool {
        !self.disabled_sources.contains(&source)
    }

    /// Sources that need a registered collector.
    pub fn enabled_sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|source| self.is_enabled(*source))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.completion_policy, CompletionPolicy::AtLeast(1));
        assert_eq!(config.enabled_sources(), Source::ALL.to_vec());
    }

    #[test]
    fn rejects_timeout_not_shorter_than_lease() {
        let config = EngineConfig {
            task_timeout: Duration::from_secs(300),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeoutExceedsLease { .. })
        ));
    }

    #[test]
    fn rejects_batch_that_outlives_its_lease() {
        // 3 * 120s runs past a 300s lease.
        let config = EngineConfig {
            lease_batch_size: 3,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BatchExceedsLease {
                batch: 3,
                task_timeout: Duration::from_secs(120),
                lease_duration: Duration::from_secs(300),
            })
        );

        let config = EngineConfig {
            lease_batch_size: 2,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = EngineConfig {
            lease_batch_size: usize::MAX,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BatchExceedsLease { .. })
        ));
    }

    #[test]
    fn rejects_zero_counts() {
        let config = EngineConfig {
            worker_count: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("worker_count")));

        let config = EngineConfig {
            max_attempts: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("max_attempts")));
    }

    #[test]
    fn rejects_disabling_website() {
        let config = EngineConfig {
            disabled_sources: BTreeSet::from([Source::Website]),
            ..EngineConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::RequiredSourceDisabled(Source::Website))
        );
    }

    #[test]
    fn partial_document_falls_back_to_defaults() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "max_attempts": 5,
            "lease_duration": 600,
            "disabled_sources": ["social"],
            "completion_policy": { "mode": "all" }
        }))
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.lease_duration, Duration::from_secs(600));
        assert_eq!(config.completion_policy, CompletionPolicy::All);
        assert!(!config.is_enabled(Source::Social));
        assert_eq!(config.task_timeout, Duration::from_secs(120));
    }
}
