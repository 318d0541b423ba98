//! Sluice - Metrics
//!
//! Named, tagged metrics for pipelines and their processors.
//!
//! # Overview
//!
//! This crate provides:
//! - Metric primitives: [`Counter`], [`EpsCounter`], [`Gauge`], [`DutyCycle`]
//! - [`MetricsService`], the shared registry every pipeline creates its metrics in
//! - Flush hooks that derive values (ratios, per-processor rates) right before a flush
//! - [`MetricsReporter`], the periodic flush loop with human or JSON output
//!
//! # Flush cycle
//!
//! ```text
//! tick ──► run flush hooks ──► flush every metric ──► format ──► tracing::info!
//!                               (EPS computes rates,
//!                                counters reset when flagged)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sluice_metrics::{MetricsService, tags};
//!
//! let service = MetricsService::new();
//! let counter = service.create_counter(
//!     "sluice.pipeline",
//!     tags([("pipeline", "main")]),
//!     &["event.in", "event.out"],
//!     true,
//! )?;
//! counter.add("event.in", 1.0);
//! ```

mod error;
pub mod format;
mod metric;
mod reporter;
mod service;

pub use error::MetricsError;
pub use format::{HumanFormatter, JsonFormatter, MetricsFormatter};
pub use metric::{
    Counter, DutyCycle, EpsCounter, Gauge, Metric, MetricKind, MetricSnapshot, Tags, Values, tags,
};
pub use reporter::MetricsReporter;
pub use service::{FlushHook, FlushWindow, HookId, MetricsService};

/// Result type for metrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;
