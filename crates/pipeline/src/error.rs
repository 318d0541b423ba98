//! Pipeline error types
//!
//! `PipelineError` covers construction, topology edits and the registry.
//! `ProcessingError` is what stages return for a single event; it is what
//! gets classified as soft or hard by the pipeline.

use thiserror::Error;

use sluice_config::ConfigError;
use sluice_metrics::MetricsError;

/// Pipeline construction and management errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid pipeline configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Metric registration failed (usually a duplicate processor id)
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// No processor with this id in the topology
    #[error("cannot find processor '{0}'")]
    ProcessorNotFound(String),

    /// Unlink of a pipeline that was never linked
    #[error("pipeline '{ancestor}' is not linked as an ancestor of '{pipeline}'")]
    NotLinked { pipeline: String, ancestor: String },

    /// Registry already holds a pipeline with this id
    #[error("pipeline '{0}' is already registered")]
    DuplicatePipeline(String),

    /// Registration attempted after the registry was finalized
    #[error("cannot register pipeline '{0}': registry is finalized")]
    RegistryFinalized(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure while processing one event
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcessingError {
    /// Event reached the end of a depth without being consumed
    #[error("Incomplete pipeline, event '{event}' is not consumed by a Sink")]
    Incomplete { event: String },

    /// Event has an unexpected shape
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Event payload could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// A stage reported a failure
    #[error("processor '{processor}' failed: {message}")]
    Failed { processor: String, message: String },

    /// A tracked future failed or panicked
    #[error("async task failed: {0}")]
    TaskFailed(String),

    /// Injection into a depth the topology does not have
    #[error("depth {depth} is out of range, pipeline has {depths} depth(s)")]
    InvalidDepth { depth: usize, depths: usize },

    /// The pipeline was dropped while an injector was still alive
    #[error("pipeline is no longer available")]
    PipelineDropped,
}

impl ProcessingError {
    /// Failure reported by the stage `processor`
    pub fn failed(processor: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            processor: processor.into(),
            message: message.to_string(),
        }
    }

    /// Short variant name, used as the exception class in alerts
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Incomplete { .. } => "Incomplete",
            Self::InvalidEvent(_) => "InvalidEvent",
            Self::Parse(_) => "Parse",
            Self::Failed { .. } => "Failed",
            Self::TaskFailed(_) => "TaskFailed",
            Self::InvalidDepth { .. } => "InvalidDepth",
            Self::PipelineDropped => "PipelineDropped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcessingError::Incomplete {
            event: "{\"a\":1}".into(),
        };
        assert!(err.to_string().starts_with("Incomplete pipeline"));

        let err = ProcessingError::failed("parser", "boom");
        assert_eq!(err.to_string(), "processor 'parser' failed: boom");

        let err = ProcessingError::InvalidDepth { depth: 3, depths: 2 };
        assert!(err.to_string().contains("depth 3"));

        let err = PipelineError::ProcessorNotFound("x".into());
        assert!(err.to_string().contains("'x'"));

        let err = PipelineError::NotLinked {
            pipeline: "child".into(),
            ancestor: "parent".into(),
        };
        assert!(err.to_string().contains("parent"));
    }

    #[test]
    fn test_kind() {
        assert_eq!(ProcessingError::Parse("x".into()).kind(), "Parse");
        assert_eq!(ProcessingError::TaskFailed("x".into()).kind(), "TaskFailed");
        assert_eq!(ProcessingError::PipelineDropped.kind(), "PipelineDropped");
    }
}
