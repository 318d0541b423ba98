//! Common types shared by all sinks

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by all sink types
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Events handed to the sink
    pub events_received: AtomicU64,

    /// Events successfully written
    pub events_written: AtomicU64,

    /// Bytes written (0 for sinks that do not serialize)
    pub bytes_written: AtomicU64,

    /// Write errors encountered
    pub write_errors: AtomicU64,
}

impl SinkMetrics {
    pub const fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn event_written(&self, bytes: u64) {
        self.events_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.events_received.store(0, Ordering::Relaxed);
        self.events_written.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.write_errors.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of sink metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
}

#[cfg(test)]
#[path = "common_test.rs"]
mod common_test;
