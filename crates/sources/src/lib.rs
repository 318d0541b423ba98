//! Sluice - Sources
//!
//! Built-in sources that feed events into a pipeline. Each source owns a
//! loop spawned by `start` and cancelled by `stop`; a stopped source can be
//! started again and resumes with the data it still holds.
//!
//! # Available Sources
//!
//! - **Internal** - bounded in-process queue fed by `put`; throttles its
//!   pipeline while the queue is full
//! - **Line** - one string event per line of stdin, a file or any other
//!   async reader
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sluice_pipeline::{Pipeline, Source, Stage};
//! use sluice_sources::InternalSource;
//!
//! let source = Arc::new(InternalSource::with_capacity("queue", 100));
//! let pipeline = Pipeline::builder("main").build()?;
//! pipeline.build([source.clone() as Arc<dyn Source>], [Stage::sink(sink)])?;
//! pipeline.start();
//!
//! source.put(serde_json::json!({"hello": "world"}), None)?;
//! ```

pub mod internal;
pub mod line;

// Common types for sources
mod common;

pub use common::{MetricsSnapshot, SourceError, SourceMetrics, SourceTask};
pub use internal::{DEFAULT_QUEUE_SIZE, InternalSource};
pub use line::LineSource;
