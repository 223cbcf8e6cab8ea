//! HealthAggregator - composite health from independent probes.
//!
//! Each probe runs in its own task under its own timeout, so a hung or panicking
//! probe only marks itself unhealthy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::ports::{Cache, Clock, JobStore, TaskQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// HTTP status for the composite document.
    pub fn status_code(self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 207,
            HealthStatus::Unhealthy => 503,
        }
    }

    /// All healthy -> healthy, none -> unhealthy, otherwise degraded.
    /// No probes at all counts as healthy.
    pub fn reduce(healthy: usize, total: usize) -> Self {
        if healthy == total {
            HealthStatus::Healthy
        } else if healthy == 0 {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(details)` when healthy.
    async fn check(&self) -> Result<serde_json::Value, String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeHealth {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, ProbeReport>,
}

pub struct HealthAggregator {
    probes: Vec<Arc<dyn HealthProbe>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl HealthAggregator {
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            probes,
            timeout,
            clock,
        }
    }

    pub async fn check(&self) -> CompositeHealth {
        let handles: Vec<_> = self
            .probes
            .iter()
            .map(|probe| {
                let probe = Arc::clone(probe);
                let timeout = self.timeout;
                let name = probe.name();
                let handle = tokio::spawn(async move {
                    let started = Instant::now();
                    let result = tokio::time::timeout(timeout, probe.check()).await;
                    (result, started.elapsed())
                });
                (name, handle)
            })
            .collect();

        let mut checks = BTreeMap::new();
        for (name, handle) in handles {
            let report = match handle.await {
                Ok((Ok(Ok(details)), elapsed)) => ProbeReport {
                    status: HealthStatus::Healthy,
                    latency_ms: millis(elapsed),
                    details: Some(details),
                    error: None,
                },
                Ok((Ok(Err(error)), elapsed)) => unhealthy(elapsed, error),
                Ok((Err(_), elapsed)) => {
                    unhealthy(elapsed, format!("timed out after {}ms", millis(self.timeout)))
                }
                Err(join_err) => unhealthy(Duration::ZERO, format!("probe aborted: {join_err}")),
            };
            if report.status != HealthStatus::Healthy {
                warn!(
                    probe = name,
                    error = report.error.as_deref().unwrap_or(""),
                    "health probe failed"
                );
            }
            checks.insert(name.to_string(), report);
        }

        let healthy = checks
            .values()
            .filter(|r| r.status == HealthStatus::Healthy)
            .count();
        CompositeHealth {
            status: HealthStatus::reduce(healthy, checks.len()),
            timestamp: self.clock.now(),
            checks,
        }
    }
}

fn unhealthy(elapsed: Duration, error: String) -> ProbeReport {
    ProbeReport {
        status: HealthStatus::Unhealthy,
        latency_ms: millis(elapsed),
        details: None,
        error: Some(error),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub struct StoreProbe(pub Arc<dyn JobStore>);

#[async_trait]
impl HealthProbe for StoreProbe {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn check(&self) -> Result<serde_json::Value, String> {
        self.0.ping().await.map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "reachable": true }))
    }
}

/// Healthy when stats can be computed; the stats are the details.
pub struct QueueProbe(pub Arc<dyn TaskQueue>);

#[async_trait]
impl HealthProbe for QueueProbe {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn check(&self) -> Result<serde_json::Value, String> {
        let stats = self.0.stats().await.map_err(|e| e.to_string())?;
        serde_json::to_value(stats).map_err(|e| e.to_string())
    }
}

pub struct CacheProbe(pub Arc<dyn Cache>);

#[async_trait]
impl HealthProbe for CacheProbe {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn check(&self) -> Result<serde_json::Value, String> {
        self.0.ping().await.map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "reachable": true }))
    }
}

/// Engine configuration plus named settings the deployment requires.
pub struct ConfigProbe {
    config: EngineConfig,
    required: Vec<(&'static str, bool)>,
}

impl ConfigProbe {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            required: Vec::new(),
        }
    }

    /// Adds a setting that must be present.
    pub fn require(mut self, name: &'static str, present: bool) -> Self {
        self.required.push((name, present));
        self
    }
}

#[async_trait]
impl HealthProbe for ConfigProbe {
    fn name(&self) -> &'static str {
        "config"
    }

    async fn check(&self) -> Result<serde_json::Value, String> {
        self.config.validate().map_err(|e| e.to_string())?;
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing settings: {}", missing.join(", ")));
        }
        Ok(serde_json::json!({
            "enabledSources": self.config.enabled_sources(),
            "workers": self.config.worker_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SystemClock;
    use rstest::rstest;

    struct Stub {
        name: &'static str,
        behaviour: Behaviour,
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        Fail,
        Hang,
        Panic,
    }

    #[async_trait]
    impl HealthProbe for Stub {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn check(&self) -> Result<serde_json::Value, String> {
            match self.behaviour {
                Behaviour::Ok => Ok(serde_json::json!({})),
                Behaviour::Fail => Err("down".to_string()),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(serde_json::json!({}))
                }
                Behaviour::Panic => panic!("probe bug"),
            }
        }
    }

    fn aggregator(behaviours: &[(&'static str, Behaviour)]) -> HealthAggregator {
        let probes = behaviours
            .iter()
            .map(|(name, behaviour)| {
                Arc::new(Stub {
                    name: *name,
                    behaviour: *behaviour,
                }) as Arc<dyn HealthProbe>
            })
            .collect();
        HealthAggregator::new(probes, Duration::from_millis(50), Arc::new(SystemClock))
    }

    #[rstest]
    #[case::all_healthy(2, 2, HealthStatus::Healthy)]
    #[case::some_healthy(1, 3, HealthStatus::Degraded)]
    #[case::none_healthy(0, 2, HealthStatus::Unhealthy)]
    #[case::no_probes(0, 0, HealthStatus::Healthy)]
    fn reduction(#[case] healthy: usize, #[case] total: usize, #[case] expected: HealthStatus) {
        assert_eq!(HealthStatus::reduce(healthy, total), expected);
    }

    #[rstest]
    #[case(HealthStatus::Healthy, 200)]
    #[case(HealthStatus::Degraded, 207)]
    #[case(HealthStatus::Unhealthy, 503)]
    fn status_codes(#[case] status: HealthStatus, #[case] code: u16) {
        assert_eq!(status.status_code(), code);
    }

    #[tokio::test]
    async fn failing_probe_degrades() {
        let health = aggregator(&[("store", Behaviour::Ok), ("cache", Behaviour::Fail)])
            .check()
            .await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.checks["cache"].error.as_deref(), Some("down"));
        assert_eq!(health.checks["store"].status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn hung_and_panicking_probes_are_isolated() {
        let health = aggregator(&[
            ("store", Behaviour::Hang),
            ("queue", Behaviour::Panic),
            ("cache", Behaviour::Ok),
        ])
        .check()
        .await;

        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.checks["store"].error.as_ref().unwrap().contains("timed out"));
        assert!(health.checks["queue"].error.as_ref().unwrap().contains("aborted"));
    }

    #[tokio::test]
    async fn all_failing_is_unhealthy() {
        let health = aggregator(&[("store", Behaviour::Fail), ("queue", Behaviour::Fail)])
            .check()
            .await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn config_probe_reports_missing_settings() {
        let probe = ConfigProbe::new(EngineConfig::default())
            .require("SOCIAL_SEARCH_URL", false)
            .require("PORT", true);
        let err = probe.check().await.unwrap_err();
        assert_eq!(err, "missing settings: SOCIAL_SEARCH_URL");

        let ok = ConfigProbe::new(EngineConfig::default()).check().await.unwrap();
        assert_eq!(ok["workers"], 4);
    }
}
