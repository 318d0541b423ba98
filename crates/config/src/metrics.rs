//! Metrics flush configuration
//!
//! Every `interval` the metrics service runs its flush hooks (pipeline
//! ratios, per-processor EPS), reports the values and resets the counters
//! that are flagged for reset.

use serde::Deserialize;
use std::time::Duration;

/// Metrics report output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    /// One human-readable line per metric (default)
    #[default]
    Human,
    /// One JSON object per metric
    Json,
}

/// Metrics configuration
///
/// # Example
///
/// ```toml
/// [metrics]
/// enabled = true
/// interval = "60s"
/// format = "json"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable periodic flushing and reporting
    pub enabled: bool,

    /// Flush interval. EPS values are computed against this window.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Output format (human, json)
    pub format: MetricsFormat,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            format: MetricsFormat::Human,
        }
    }
}
