//! Sluice - Transform
//!
//! Built-in stages for sluice pipelines.
//!
//! # Overview
//!
//! | Stage | Kind | Role |
//! |-------|------|------|
//! | [`JsonParser`] | processor | string event → JSON value (`ProcessingError::Parse` on failure) |
//! | [`JsonSerializer`] | processor | JSON value → compact or pretty string |
//! | [`FieldFilter`] | processor | drop or keep events by field conditions |
//! | [`SplitGenerator`] | generator | fan out array elements into the next depth |
//!
//! # Design Principles
//!
//! - **Fast**: stages run inline on the routing path and never block
//! - **Thread-safe**: stages may be called from multiple tasks concurrently
//! - **Fail per event**: bad input is a `ProcessingError`, classified by the
//!   pipeline as soft or hard; construction errors are [`TransformError`]
//!
//! # Example
//!
//! ```ignore
//! use sluice_pipeline::Stage;
//! use sluice_transform::{Condition, FieldFilter, FilterConfig, JsonParser};
//!
//! let filter = FieldFilter::new(
//!     "drop-debug",
//!     FilterConfig::new().with_condition(Condition::eq("level", "debug")),
//! )?;
//! pipeline.build(
//!     [source],
//!     [Stage::processor(JsonParser::new("parse")), Stage::processor(filter), Stage::sink(sink)],
//! )?;
//! ```

mod error;
pub mod filter;
pub mod json;
pub mod split;

pub use error::{TransformError, TransformResult};
pub use filter::{
    Condition, FieldFilter, FilterAction, FilterConfig, FilterMetrics, MatchMode, Operator,
};
pub use json::{JsonParser, JsonSerializer};
pub use split::SplitGenerator;
