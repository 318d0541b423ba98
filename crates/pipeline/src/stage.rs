//! Stage traits
//!
//! A pipeline depth is an ordered list of stages. Each stage is one of:
//!
//! ```text
//! Processor  event ──► Some(event') | None (consumed)
//! Generator  event ──► tracked future injecting 0..n events into depth + 1
//! Sink       event ──► None (terminal)
//! ```
//!
//! `process` runs synchronously on the routing path and must never block.
//! Anything slow belongs in a generator future.

use std::sync::Weak;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::error::ProcessingError;
use crate::event::{Context, Event};
use crate::pipeline::{Pipeline, Trail};

/// Outcome of a synchronous stage
pub type StageResult = Result<Option<Event>, ProcessingError>;

/// Transforms or consumes an event
///
/// Implementors must be `Send + Sync`; one instance may be called from
/// several tasks at once.
///
/// # Example
///
/// ```ignore
/// struct Upper;
///
/// impl Processor for Upper {
///     fn id(&self) -> &str {
///         "upper"
///     }
///
///     fn process(&self, _context: &mut Context, event: Event) -> StageResult {
///         Ok(event.as_str().map(|s| Event::String(s.to_uppercase())))
///     }
/// }
/// ```
pub trait Processor: Send + Sync {
    /// Unique id within the pipeline
    fn id(&self) -> &str;

    /// Return the event to pass on, `None` when it was consumed
    fn process(&self, context: &mut Context, event: Event) -> StageResult;
}

/// Fans an event out into the next depth asynchronously
pub trait Generator: Send + Sync {
    fn id(&self) -> &str;

    /// Called once when appended, with the depth the generator sits at
    fn set_depth(&mut self, _depth: usize) {}

    /// Build the future that injects derived events through `injector`
    ///
    /// The pipeline tracks the future; its error travels the completion path
    /// to the last sink's `handle_error` and then to `set_error`.
    fn generate(
        &self,
        context: Context,
        event: Event,
        injector: Injector,
    ) -> BoxFuture<'static, Result<(), ProcessingError>>;
}

/// Terminal stage
pub trait Sink: Send + Sync {
    fn id(&self) -> &str;

    /// Consume the event. Returning `Some` means it was not consumed.
    fn process(&self, context: &mut Context, event: Event) -> StageResult;

    /// Offer a substitute event for a failed tracked future
    ///
    /// `None` (the default) reports the failure without context or event.
    fn handle_error(
        &self,
        _context: &Context,
        _event: Option<&Event>,
        _error: &ProcessingError,
        _timestamp: DateTime<Utc>,
    ) -> Option<Event> {
        None
    }
}

/// Stage type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageKind {
    Processor,
    Generator,
    Sink,
}

/// A stage in a pipeline depth
pub enum Stage {
    Processor(Box<dyn Processor>),
    Generator(Box<dyn Generator>),
    Sink(Box<dyn Sink>),
}

impl Stage {
    pub fn processor(p: impl Processor + 'static) -> Self {
        Self::Processor(Box::new(p))
    }

    pub fn generator(g: impl Generator + 'static) -> Self {
        Self::Generator(Box::new(g))
    }

    pub fn sink(s: impl Sink + 'static) -> Self {
        Self::Sink(Box::new(s))
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Processor(p) => p.id(),
            Self::Generator(g) => g.id(),
            Self::Sink(s) => s.id(),
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Self::Processor(_) => StageKind::Processor,
            Self::Generator(_) => StageKind::Generator,
            Self::Sink(_) => StageKind::Sink,
        }
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Sink(_))
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Re-entry handle given to generators, bound to one depth
#[derive(Clone)]
pub struct Injector {
    pipeline: Weak<Pipeline>,
    depth: usize,
    trail: Trail,
}

impl Injector {
    pub(crate) fn new(pipeline: Weak<Pipeline>, depth: usize, trail: Trail) -> Self {
        Self { pipeline, depth, trail }
    }

    /// Depth events are injected into
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Inject an event; never waits for readiness
    pub fn inject(&self, context: Option<Context>, event: Event) -> Result<(), ProcessingError> {
        match self.pipeline.upgrade() {
            Some(pipeline) => pipeline.inject_traced(context, event, self.depth, Some(&self.trail)),
            None => Err(ProcessingError::PipelineDropped),
        }
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector").field("depth", &self.depth).finish()
    }
}
