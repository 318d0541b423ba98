//! Stdout sink - JSON lines for debugging and piping
//!
//! Not intended for production use at high throughput: every event takes
//! the writer lock and is flushed individually.
//!
//! # Example Output
//!
//! ```text
//! {"level":"info","message":"started"}
//! {"level":"error","message":"failed"}
//! ```
//!
//! With `show_context` each line is prefixed by the event context:
//!
//! ```text
//! {"source":"stdin"} {"level":"info","message":"started"}
//! ```

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use sluice_pipeline::{Context, Event, ProcessingError, Sink, StageResult};

use crate::common::{MetricsSnapshot, SinkMetrics};

#[cfg(test)]
#[path = "stdout_test.rs"]
mod stdout_test;

/// Output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdoutFormat {
    /// One event per line
    #[default]
    Compact,
    /// Indented, multi-line
    Pretty,
}

/// Configuration for the stdout sink
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    pub format: StdoutFormat,

    /// Prefix each event with its context
    pub show_context: bool,

    /// Write string events verbatim instead of as quoted JSON strings
    pub raw_strings: bool,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            format: StdoutFormat::Compact,
            show_context: false,
            raw_strings: true,
        }
    }
}

impl StdoutConfig {
    pub fn pretty() -> Self {
        Self {
            format: StdoutFormat::Pretty,
            ..Self::default()
        }
    }

    pub fn with_context() -> Self {
        Self {
            show_context: true,
            ..Self::default()
        }
    }
}

/// Sink writing events to stdout or any other writer
pub struct StdoutSink {
    id: String,
    config: StdoutConfig,
    writer: Mutex<Box<dyn Write + Send>>,
    metrics: Arc<SinkMetrics>,
}

impl StdoutSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, StdoutConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: StdoutConfig) -> Self {
        Self::with_writer(id, config, io::stdout())
    }

    /// Write to `writer` instead of stdout
    pub fn with_writer(
        id: impl Into<String>,
        config: StdoutConfig,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            writer: Mutex::new(Box::new(writer)),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn config(&self) -> &StdoutConfig {
        &self.config
    }

    pub fn metrics_handle(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Render one event (plus its context) as the text written for it
    pub fn render(&self, context: &Context, event: &Event) -> serde_json::Result<String> {
        let mut line = String::new();
        if self.config.show_context {
            line.push_str(&serde_json::to_string(context)?);
            line.push(' ');
        }

        match event {
            Value::String(raw) if self.config.raw_strings => line.push_str(raw),
            other => {
                let body = match self.config.format {
                    StdoutFormat::Compact => serde_json::to_string(other)?,
                    StdoutFormat::Pretty => serde_json::to_string_pretty(other)?,
                };
                line.push_str(&body);
            }
        }
        line.push('\n');
        Ok(line)
    }

    fn write(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

impl std::fmt::Debug for StdoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdoutSink")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl Sink for StdoutSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self, context: &mut Context, event: Event) -> StageResult {
        self.metrics.event_received();

        let line = self
            .render(context, &event)
            .map_err(|e| ProcessingError::failed(&self.id, e))?;

        match self.write(&line) {
            Ok(()) => {
                self.metrics.event_written(line.len() as u64);
                Ok(None)
            }
            Err(e) => {
                self.metrics.write_error();
                Err(ProcessingError::failed(&self.id, e))
            }
        }
    }
}
