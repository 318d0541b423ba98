//! Per-pipeline configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `async_concurency_limit` | int | `1000` | In-flight tracked futures before the pipeline throttles itself |
//! | `reset_profiler` | bool | `true` | Reset per-processor profiler counters on every metrics flush |
//! | `stop_on_errors` | bool | `true` | Default error policy: every processing error halts the pipeline |
//! | `alert_id` | string | random UUID | Stable identity used to correlate alerts of this pipeline |
//! | `chillout_trigger` | int | `10000` | Every Nth readiness check yields to the scheduler |
//! | `drain_timeout` | duration | unbounded | Upper bound on waiting for in-flight futures in `stop()` |

use serde::Deserialize;
use std::time::Duration;

use crate::{ConfigError, Result};

/// Default number of in-flight futures before self-throttling
pub const DEFAULT_ASYNC_CONCURRENCY_LIMIT: usize = 1000;

/// Default number of readiness checks between forced yields
pub const DEFAULT_CHILLOUT_TRIGGER: u64 = 10_000;

/// Configuration of a single pipeline
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum in-flight futures spawned through the pipeline
    #[serde(rename = "async_concurency_limit", alias = "async_concurrency_limit")]
    pub async_concurrency_limit: usize,

    /// Whether profiler counters reset on each metrics flush
    pub reset_profiler: bool,

    /// Default error classification: `true` makes every error hard
    pub stop_on_errors: bool,

    /// Alert identity; a random UUID is generated when absent
    pub alert_id: Option<String>,

    /// Readiness checks between forced scheduler yields
    pub chillout_trigger: u64,

    /// Bound on the in-flight future drain performed by `stop()`
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            async_concurrency_limit: DEFAULT_ASYNC_CONCURRENCY_LIMIT,
            reset_profiler: true,
            stop_on_errors: true,
            alert_id: None,
            chillout_trigger: DEFAULT_CHILLOUT_TRIGGER,
            drain_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Set the concurrency limit
    pub fn with_async_concurrency_limit(mut self, limit: usize) -> Self {
        self.async_concurrency_limit = limit;
        self
    }

    /// Set the default error policy
    pub fn with_stop_on_errors(mut self, stop: bool) -> Self {
        self.stop_on_errors = stop;
        self
    }

    /// Set a fixed alert id
    pub fn with_alert_id(mut self, alert_id: impl Into<String>) -> Self {
        self.alert_id = Some(alert_id.into());
        self
    }

    /// Set the chillout trigger
    pub fn with_chillout_trigger(mut self, trigger: u64) -> Self {
        self.chillout_trigger = trigger;
        self
    }

    /// Bound the drain performed by `stop()`
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Validate the configuration of pipeline `id`
    pub fn validate(&self, id: &str) -> Result<()> {
        if self.async_concurrency_limit <= 1 {
            return Err(ConfigError::invalid_value(
                "pipeline",
                id,
                "async_concurency_limit",
                format!("must be greater than 1, got {}", self.async_concurrency_limit),
            ));
        }
        if self.chillout_trigger == 0 {
            return Err(ConfigError::invalid_value(
                "pipeline",
                id,
                "chillout_trigger",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.async_concurrency_limit, 1000);
        assert!(config.reset_profiler);
        assert!(config.stop_on_errors);
        assert!(config.alert_id.is_none());
        assert_eq!(config.chillout_trigger, 10_000);
        assert!(config.drain_timeout.is_none());
        assert!(config.validate("p").is_ok());
    }

    #[test]
    fn test_both_spellings_of_limit() {
        let legacy: PipelineConfig = toml::from_str("async_concurency_limit = 7").unwrap();
        assert_eq!(legacy.async_concurrency_limit, 7);

        let corrected: PipelineConfig = toml::from_str("async_concurrency_limit = 9").unwrap();
        assert_eq!(corrected.async_concurrency_limit, 9);
    }

    #[test]
    fn test_limit_must_exceed_one() {
        let config = PipelineConfig::default().with_async_concurrency_limit(1);
        assert!(config.validate("p").is_err());

        let config = PipelineConfig::default().with_async_concurrency_limit(2);
        assert!(config.validate("p").is_ok());
    }

    #[test]
    fn test_zero_chillout_rejected() {
        let config = PipelineConfig::default().with_chillout_trigger(0);
        let err = config.validate("p").unwrap_err();
        assert!(err.to_string().contains("chillout_trigger"));
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_stop_on_errors(false)
            .with_alert_id("a-1")
            .with_drain_timeout(Duration::from_millis(250));
        assert!(!config.stop_on_errors);
        assert_eq!(config.alert_id.as_deref(), Some("a-1"));
        assert_eq!(config.drain_timeout, Some(Duration::from_millis(250)));
    }
}
