//! Logging configuration
//!
//! Controls the `tracing` subscriber installed by the `sluice` binary.

use serde::Deserialize;

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to a tracing level filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output (default)
    #[default]
    Console,
    /// JSON structured logging
    Json,
}

/// Log output destination
///
/// Defaults to stderr: the binary writes events to stdout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    /// Append to a file
    #[serde(untagged)]
    File(String),
}

/// Logging configuration
///
/// # Example
///
/// ```toml
/// [log]
/// level = "info"
/// format = "console"
/// output = "stderr"
/// directives = ["sluice_pipeline=debug"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base log level
    pub level: LogLevel,

    /// Output format (console, json)
    pub format: LogFormat,

    /// Output destination (stdout, stderr, or file path)
    pub output: LogOutput,

    /// Extra per-target filter directives, e.g. `sluice_pipeline=trace`
    pub directives: Vec<String>,
}

impl LogConfig {
    /// Full `EnvFilter` directive string: the base level followed by any
    /// per-target overrides
    pub fn filter_directive(&self) -> String {
        let mut directive = self.level.as_str().to_string();
        for extra in &self.directives {
            directive.push(',');
            directive.push_str(extra);
        }
        directive
    }
}
