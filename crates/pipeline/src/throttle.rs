//! Throttle keys
//!
//! Any key in a pipeline's throttle set makes it not ready. Keys are
//! propagated to linked ancestors unchanged.

/// Opaque backpressure owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThrottleKey {
    /// In-flight future limit of the named pipeline
    AsyncFutures(String),
    /// Any other owner, usually a source or processor id
    Owner(String),
}

impl From<&str> for ThrottleKey {
    fn from(owner: &str) -> Self {
        Self::Owner(owner.to_string())
    }
}

impl From<String> for ThrottleKey {
    fn from(owner: String) -> Self {
        Self::Owner(owner)
    }
}

impl std::fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AsyncFutures(pipeline) => write!(f, "async_futures:{}", pipeline),
            Self::Owner(owner) => f.write_str(owner),
        }
    }
}
