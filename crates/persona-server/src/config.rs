use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use persona_core::EngineConfig;
use persona_core::app::ConfigProbe;
use persona_core::domain::{CompletionPolicy, Source};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub engine: EngineConfig,
    pub social_search_url: Option<String>,
    /// Social was left enabled by the operator, so the search endpoint is required.
    pub social_requested: bool,
    pub social_search_limit: Option<usize>,
    pub collector_timeout: Duration,
    pub user_agent: Option<String>,
    pub max_body_bytes: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = EngineConfig::default();

        let mut engine = EngineConfig {
            max_attempts: parse_or(&get, "PERSONA_MAX_ATTEMPTS", defaults.max_attempts)?,
            worker_count: parse_or(&get, "PERSONA_WORKERS", defaults.worker_count)?,
            lease_duration: secs_or(&get, "PERSONA_LEASE_SECS", defaults.lease_duration)?,
            task_timeout: secs_or(&get, "PERSONA_TASK_TIMEOUT_SECS", defaults.task_timeout)?,
            job_timeout: secs_or(&get, "PERSONA_JOB_TIMEOUT_SECS", defaults.job_timeout)?,
            sweep_interval: secs_or(&get, "PERSONA_SWEEP_SECS", defaults.sweep_interval)?,
            ..defaults
        };

        if let Some(raw) = get("PERSONA_MIN_SUCCESSES") {
            engine.completion_policy = parse_completion_policy(&raw)
                .with_context(|| format!("PERSONA_MIN_SUCCESSES is invalid: {raw}"))?;
        }

        if let Some(raw) = get("PERSONA_DISABLED_SOURCES") {
            engine.disabled_sources = parse_sources(&raw)
                .context("PERSONA_DISABLED_SOURCES must be a comma-separated source list")?;
        }

        let social_search_url = get("SOCIAL_SEARCH_URL").filter(|url| !url.trim().is_empty());
        let social_requested = engine.is_enabled(Source::Social);
        if social_requested && social_search_url.is_none() {
            tracing::warn!("SOCIAL_SEARCH_URL not set; social source disabled");
            engine.disabled_sources.insert(Source::Social);
        }

        Ok(Self {
            port: parse_or(&get, "PORT", 3000)?,
            engine,
            social_search_url,
            social_requested,
            social_search_limit: parse_opt(&get, "SOCIAL_SEARCH_LIMIT")?,
            collector_timeout: secs_or(
                &get,
                "PERSONA_COLLECTOR_HTTP_TIMEOUT_SECS",
                Duration::from_secs(30),
            )?,
            user_agent: get("PERSONA_USER_AGENT").filter(|ua| !ua.trim().is_empty()),
            max_body_bytes: parse_opt(&get, "PERSONA_MAX_BODY_BYTES")?,
        })
    }

    /// Config health probe. The social search endpoint only counts as missing
    /// when the operator left the social source on.
    pub fn config_probe(&self) -> ConfigProbe {
        let probe = ConfigProbe::new(self.engine.clone());
        if self.social_requested {
            probe.require("SOCIAL_SEARCH_URL", self.social_search_url.is_some())
        } else {
            probe
        }
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("{name} must be a valid number"))
        })
        .transpose()
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        None => Ok(default),
    }
}

fn secs_or(get: &impl Fn(&str) -> Option<String>, name: &str, default: Duration) -> Result<Duration> {
    let secs = parse_or(get, name, default.as_secs())?;
    Ok(Duration::from_secs(secs))
}

/// `all` or a positive count.
fn parse_completion_policy(raw: &str) -> Result<CompletionPolicy> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("all") {
        return Ok(CompletionPolicy::All);
    }
    let n: usize = raw.parse().context("expected `all` or a number")?;
    anyhow::ensure!(n > 0, "minimum successes must be at least 1");
    Ok(CompletionPolicy::AtLeast(n))
}

fn parse_sources(raw: &str) -> Result<BTreeSet<Source>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Source>().map_err(anyhow::Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_core::app::HealthProbe;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.social_search_url.is_none());
        assert!(config.user_agent.is_none());
        assert!(config.max_body_bytes.is_none());
        // No search endpoint: social is switched off.
        assert_eq!(
            config.engine,
            EngineConfig {
                disabled_sources: BTreeSet::from([Source::Social]),
                ..EngineConfig::default()
            }
        );
    }

    #[tokio::test]
    async fn missing_search_endpoint_degrades_config_probe() {
        let config = load(&[]).unwrap();
        let err = config.config_probe().check().await.unwrap_err();
        assert!(err.contains("SOCIAL_SEARCH_URL"));
    }

    #[tokio::test]
    async fn deliberately_disabled_social_needs_no_endpoint() {
        let config = load(&[("PERSONA_DISABLED_SOURCES", "social")]).unwrap();
        assert!(!config.social_requested);
        assert!(config.config_probe().check().await.is_ok());
    }

    #[tokio::test]
    async fn configured_search_endpoint_passes_config_probe() {
        let config = load(&[("SOCIAL_SEARCH_URL", "https://search.example.com/api")]).unwrap();
        assert!(config.engine.is_enabled(Source::Social));
        assert!(config.config_probe().check().await.is_ok());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("PORT", "8080"),
            ("PERSONA_MAX_ATTEMPTS", "5"),
            ("PERSONA_WORKERS", "2"),
            ("PERSONA_LEASE_SECS", "600"),
            ("PERSONA_MIN_SUCCESSES", "all"),
            ("PERSONA_DISABLED_SOURCES", "social, competitor"),
            ("SOCIAL_SEARCH_URL", "https://search.example.com/api"),
            ("SOCIAL_SEARCH_LIMIT", "20"),
            ("PERSONA_USER_AGENT", "persona-bot/2"),
            ("PERSONA_MAX_BODY_BYTES", "65536"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.engine.max_attempts, 5);
        assert_eq!(config.engine.worker_count, 2);
        assert_eq!(config.engine.lease_duration, Duration::from_secs(600));
        assert_eq!(config.engine.completion_policy, CompletionPolicy::All);
        assert_eq!(
            config.engine.disabled_sources,
            BTreeSet::from([Source::Social, Source::Competitor])
        );
        assert_eq!(
            config.social_search_url.as_deref(),
            Some("https://search.example.com/api")
        );
        assert_eq!(config.social_search_limit, Some(20));
        assert_eq!(config.user_agent.as_deref(), Some("persona-bot/2"));
        assert_eq!(config.max_body_bytes, Some(65536));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("PERSONA_MIN_SUCCESSES", "0")]).is_err());
        assert!(load(&[("PERSONA_DISABLED_SOURCES", "website,blogs")]).is_err());
        assert!(load(&[("PERSONA_MAX_BODY_BYTES", "lots")]).is_err());
    }
}
