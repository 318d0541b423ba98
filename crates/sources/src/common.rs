//! Common types and utilities for sources
//!
//! Shared counters plus [`SourceTask`], the start/stop bookkeeping every
//! source loop needs: at most one running loop, cancellation on stop and a
//! fresh loop on restart.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Source errors
#[derive(Debug, Error)]
pub enum SourceError {
    /// The bounded queue has no room left
    #[error("queue of source '{0}' is full")]
    QueueFull(String),

    /// The source can no longer accept events
    #[error("source '{0}' is closed")]
    Closed(String),
}

/// Counters shared by all source types
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Events read or queued
    pub events_received: AtomicU64,

    /// Events handed to the pipeline
    pub events_processed: AtomicU64,

    /// Read or processing errors
    pub errors: AtomicU64,

    /// Times the loop was (re)started
    pub starts: AtomicU64,
}

impl SourceMetrics {
    pub const fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            starts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn started(&self) {
        self.starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            starts: self.starts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of source metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_processed: u64,
    pub errors: u64,
    pub starts: u64,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Lifecycle of one spawned source loop
#[derive(Default)]
pub struct SourceTask {
    running: Mutex<Option<Running>>,
}

impl SourceTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the loop built by `make` unless one is already running
    ///
    /// Returns false when a loop is running or no tokio runtime is available.
    pub fn spawn<F, Fut>(&self, source: &str, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!(source = %source, "source already running");
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(source = %source, error = %e, "cannot start source outside a tokio runtime");
                return false;
            }
        };

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(make(cancel.clone()));
        *running = Some(Running { cancel, handle });
        true
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(&self, source: &str) {
        let running = self.running.lock().take();
        let Some(Running { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await
            && e.is_panic()
        {
            tracing::error!(source = %source, error = %e, "source loop panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl std::fmt::Debug for SourceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceTask")
            .field("running", &self.is_running())
            .finish()
    }
}
