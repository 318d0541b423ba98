//! Metrics error types

use thiserror::Error;

/// Errors raised by the metrics service
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric with the same name and tags is already registered
    #[error("metric '{name}' with tags {tags} is already registered")]
    Duplicate { name: String, tags: String },

    /// No metric with this name and tags is registered
    #[error("metric '{name}' with tags {tags} is not registered")]
    NotFound { name: String, tags: String },
}

impl MetricsError {
    pub(crate) fn duplicate(name: &str, tags: &crate::Tags) -> Self {
        Self::Duplicate {
            name: name.to_string(),
            tags: format!("{:?}", tags),
        }
    }

    pub(crate) fn not_found(name: &str, tags: &crate::Tags) -> Self {
        Self::NotFound {
            name: name.to_string(),
            tags: format!("{:?}", tags),
        }
    }
}
