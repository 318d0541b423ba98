//! Null sink - counts and discards every event
//!
//! # Use Cases
//!
//! - **Benchmarking**: measure pipeline throughput without I/O
//! - **Testing**: validate routing and source configuration
//!
//! # Example
//!
//! ```ignore
//! use sluice_sinks::NullSink;
//!
//! let sink = NullSink::new("null");
//! let metrics = sink.metrics_handle();
//! pipeline.append_processor(Stage::sink(sink))?;
//! ```

use std::sync::Arc;

use sluice_pipeline::{Context, Event, Sink, StageResult};

use crate::common::{MetricsSnapshot, SinkMetrics};

#[cfg(test)]
mod null_test;

/// Sink that consumes and drops everything it receives
#[derive(Debug, Clone)]
pub struct NullSink {
    id: String,
    metrics: Arc<SinkMetrics>,
}

impl NullSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    /// Shared handle to the counters, usable after the sink moved into a pipeline
    pub fn metrics_handle(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new("null")
    }
}

impl Sink for NullSink {
    fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    fn process(&self, _context: &mut Context, _event: Event) -> StageResult {
        self.metrics.event_received();
        self.metrics.event_written(0);
        Ok(None)
    }
}
