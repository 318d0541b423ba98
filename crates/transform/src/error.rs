//! Transform error types
//!
//! Errors raised while constructing a stage. Per-event failures are
//! `ProcessingError`s and never use this type.

use thiserror::Error;

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Errors that can occur while building a transform stage
#[derive(Debug, Error)]
pub enum TransformError {
    /// Invalid stage configuration
    #[error("invalid configuration for '{stage}': {message}")]
    Config { stage: String, message: String },

    /// A regex condition failed to compile
    #[error("invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl TransformError {
    /// Create a config error for `stage`
    pub fn config(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Result type for stage construction
pub type TransformResult<T> = Result<T, TransformError>;
