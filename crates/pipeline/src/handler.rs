//! Error classification

use crate::error::ProcessingError;
use crate::event::{Context, Event};

/// Decides whether a processing error is soft
///
/// `true` means soft: the event is dropped, the warning counters move and
/// the pipeline stays ready. `false` means hard: the error is persisted and
/// the pipeline stops until cleared.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: &ProcessingError, context: &Context, event: Option<&Event>) -> bool;
}

impl<F> ErrorHandler for F
where
    F: Fn(&ProcessingError, &Context, Option<&Event>) -> bool + Send + Sync,
{
    fn handle_error(&self, error: &ProcessingError, context: &Context, event: Option<&Event>) -> bool {
        self(error, context, event)
    }
}

/// Default policy driven by `stop_on_errors`
#[derive(Debug, Clone, Copy)]
pub struct StopOnErrors(pub bool);

impl ErrorHandler for StopOnErrors {
    fn handle_error(&self, _error: &ProcessingError, _context: &Context, _event: Option<&Event>) -> bool {
        !self.0
    }
}
