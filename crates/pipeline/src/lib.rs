//! Sluice - Pipeline
//!
//! In-process stream processing: named pipelines that move JSON events from
//! sources through depth-indexed stages into sinks.
//!
//! # Architecture
//!
//! ```text
//! [Source] ──process()──► depth 0: [Processor] → [Processor] → [Generator]
//!                                                                  │ ensure_future
//!                          depth 1: [Processor] → [Sink] ◄──inject()┘
//!
//!          unconsumed at the end of a depth ──► sink fallback table
//!                                              (first matching predicate)
//! ```
//!
//! # Key Design
//!
//! - **Readiness**: `ready == error.is_none() && throttles.is_empty()`;
//!   sources wait on it through `process()`
//! - **Backpressure**: throttle keys, propagated from linked children to
//!   ancestors; the pipeline throttles itself at `async_concurency_limit`
//!   in-flight futures
//! - **Errors**: depth 0 classifies locally (soft → warning, hard → stop
//!   until cleared); deeper failures travel the generator future's
//!   completion path
//! - **Lock discipline**: no lock is held while a stage runs
//!
//! # Example
//!
//! ```ignore
//! use sluice_pipeline::{Pipeline, Stage};
//!
//! let pipeline = Pipeline::builder("main").build()?;
//! pipeline.build([source], [Stage::processor(parser), Stage::sink(sink)])?;
//! pipeline.start();
//! ```

mod alert;
mod error;
mod event;
mod handler;
mod log;
mod metrics;
mod pipeline;
mod pubsub;
mod registry;
mod snapshot;
mod source;
mod stage;
mod throttle;

pub use alert::{Alert, AlertData, AlertService, LogAlertService};
pub use error::{PipelineError, ProcessingError, Result};
pub use event::{Context, Event, merge_context};
pub use handler::{ErrorHandler, StopOnErrors};
pub use log::{LOG_CAPACITY, LogLevel, LogRecord, PipelineLog};
pub use metrics::{PipelineMetrics, ProcessorMetrics};
pub use pipeline::{ErrorRecord, Pipeline, PipelineBuilder, ProcessorHandle, SinkPredicate};
pub use pubsub::{DEFAULT_PUBSUB_CAPACITY, Message, PubSub, Topic};
pub use registry::PipelineRegistry;
pub use snapshot::{PipelineSnapshot, ProcessorInfo};
pub use source::Source;
pub use stage::{Generator, Injector, Processor, Sink, Stage, StageKind, StageResult};
pub use throttle::ThrottleKey;

// Re-exported so stage implementors don't need their own dependency
pub use async_trait::async_trait;
pub use futures_util::future::BoxFuture;


#[cfg(test)]
mod registry_test;
