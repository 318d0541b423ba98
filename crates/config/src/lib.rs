//! Sluice Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid configuration - only specify what you need to change.
//!
//! # Parsing
//!
//! ```
//! use sluice_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[pipelines.main]\nstop_on_errors = false").unwrap();
//! assert!(!config.pipeline("main").stop_on_errors);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "debug"
//! format = "json"
//!
//! [metrics]
//! interval = "60s"
//!
//! [pipelines.ingest]
//! async_concurency_limit = 500
//! stop_on_errors = false
//! alert_id = "ingest-alerts"
//! ```

mod error;
mod logging;
mod metrics;
mod pipeline;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use metrics::{MetricsConfig, MetricsFormat};
pub use pipeline::{
    DEFAULT_ASYNC_CONCURRENCY_LIMIT, DEFAULT_CHILLOUT_TRIGGER, PipelineConfig,
};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Metrics flush/reporting configuration
    pub metrics: MetricsConfig,

    /// Per-pipeline configuration, keyed by pipeline id
    pub pipelines: HashMap<String, PipelineConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, contains invalid TOML,
    /// or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (id, pipeline) in &self.pipelines {
            pipeline.validate(id)?;
        }
        Ok(())
    }

    /// Configuration for a pipeline, falling back to defaults when the
    /// pipeline has no section of its own
    pub fn pipeline(&self, id: &str) -> PipelineConfig {
        self.pipelines.get(id).cloned().unwrap_or_default()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
