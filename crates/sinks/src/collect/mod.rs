//! Collect sink - keeps events in a shared in-memory buffer
//!
//! Clones share the buffer, so a test or an embedding application keeps one
//! clone and hands the other to the pipeline. With a capacity the oldest
//! events are evicted first.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use sluice_pipeline::{Context, Event, Sink, StageResult};

use crate::common::{MetricsSnapshot, SinkMetrics};

#[cfg(test)]
#[path = "collect_test.rs"]
mod collect_test;

/// An event together with the context it was delivered with
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub context: Context,
    pub event: Event,
}

#[derive(Debug, Clone)]
pub struct CollectSink {
    id: String,
    capacity: Option<usize>,
    buffer: Arc<Mutex<VecDeque<Collected>>>,
    metrics: Arc<SinkMetrics>,
}

impl CollectSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity: None,
            buffer: Arc::default(),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    /// Bound the buffer, evicting the oldest events
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Events currently buffered, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.buffer.lock().iter().map(|c| c.event.clone()).collect()
    }

    /// Events with their contexts, oldest first
    pub fn collected(&self) -> Vec<Collected> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Drain the buffer
    pub fn take(&self) -> Vec<Event> {
        self.buffer.lock().drain(..).map(|c| c.event).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Sink for CollectSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self, context: &mut Context, event: Event) -> StageResult {
        self.metrics.event_received();

        let mut buffer = self.buffer.lock();
        if let Some(capacity) = self.capacity {
            while buffer.len() >= capacity.max(1) {
                buffer.pop_front();
            }
        }
        buffer.push_back(Collected {
            context: context.clone(),
            event,
        });
        self.metrics.event_written(0);
        Ok(None)
    }
}
