//! Sluice - Sinks
//!
//! Terminal stages for sluice pipelines. A sink consumes the event by
//! returning `Ok(None)`; anything else leaves the pipeline incomplete.
//!
//! ```text
//! [Processor] → [Processor] → [Sink] ──► destination
//! ```
//!
//! # Available Sinks
//!
//! | Sink | Purpose |
//! |------|---------|
//! | `null` | Benchmarking (count and discard) |
//! | `stdout` | JSON lines for debugging and piping |
//! | `collect` | Shared in-memory buffer for tests and embedding |
//!
//! # Example
//!
//! ```ignore
//! use sluice_pipeline::Stage;
//! use sluice_sinks::{StdoutConfig, StdoutSink};
//!
//! pipeline.append_processor(Stage::sink(StdoutSink::with_config("out", StdoutConfig::pretty())))?;
//! ```

/// Null sink - discards all events
pub mod null;

/// Stdout sink - JSON lines output
pub mod stdout;

/// Collect sink - in-memory buffer
pub mod collect;

/// Counters shared by all sinks
mod common;

pub use collect::{CollectSink, Collected};
pub use common::{MetricsSnapshot, SinkMetrics};
pub use null::NullSink;
pub use stdout::{StdoutConfig, StdoutFormat, StdoutSink};
