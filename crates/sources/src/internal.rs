//! Internal source - bounded in-process queue
//!
//! Application code hands events to [`InternalSource::put`]; a loop moves
//! them into the pipeline once it is ready. While the queue is full the
//! source throttles its pipeline (and through it every linked ancestor)
//! with its own id as the key.
//!
//! ```text
//! put() ──► [mpsc, capacity N] ──loop──► pipeline.process_now()
//!              │ full
//!              └──► pipeline.throttle(id, true)
//! ```
//!
//! The loop takes one event, then waits with `ready_except(own key)`: it
//! keeps draining while the only throttle left is its own, which is what
//! releases it.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_pipeline::{Context, Event, Pipeline, Source, ThrottleKey};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::common::{MetricsSnapshot, SourceError, SourceMetrics, SourceTask};

#[cfg(test)]
#[path = "internal_test.rs"]
mod internal_test;

/// Default queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 10;

type Item = (Option<Context>, Event);

struct Shared {
    id: String,
    key: ThrottleKey,
    tx: mpsc::Sender<Item>,
    pipeline: Mutex<Weak<Pipeline>>,
    /// Whether our key is currently in the pipeline's throttle set
    throttled: Mutex<bool>,
    /// Dequeued but not yet processed when the loop stopped
    pending: Mutex<Option<Item>>,
    metrics: SourceMetrics,
}

impl Shared {
    fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipeline.lock().upgrade()
    }

    /// Match the throttle to the queue fill level
    ///
    /// Called after every send and receive; evaluated under the lock so the
    /// last caller always sees the latest fill level.
    fn sync_throttle(&self) {
        let mut throttled = self.throttled.lock();
        let enable = self.tx.capacity() == 0;
        if *throttled == enable {
            return;
        }
        *throttled = enable;

        if let Some(pipeline) = self.pipeline() {
            tracing::debug!(source = %self.id, pipeline = %pipeline.id(), enable, "queue throttle");
            pipeline.throttle(self.key.clone(), enable);
        }
    }
}

pub struct InternalSource {
    capacity: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Item>>>,
    shared: Arc<Shared>,
    task: SourceTask,
}

impl InternalSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_capacity(id, DEFAULT_QUEUE_SIZE)
    }

    /// Queue holding at most `capacity` events (at least one)
    pub fn with_capacity(id: impl Into<String>, capacity: usize) -> Self {
        let id = id.into();
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            capacity,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            shared: Arc::new(Shared {
                key: ThrottleKey::Owner(id.clone()),
                id,
                tx,
                pipeline: Mutex::new(Weak::new()),
                throttled: Mutex::new(false),
                pending: Mutex::new(None),
                metrics: SourceMetrics::new(),
            }),
            task: SourceTask::new(),
        }
    }

    /// Queue an event without waiting
    ///
    /// Fails with [`SourceError::QueueFull`] when there is no room; the
    /// pipeline is throttled from the moment the last slot is taken.
    pub fn put(&self, event: Event, context: Option<Context>) -> Result<(), SourceError> {
        match self.shared.tx.try_send((context, event)) {
            Ok(()) => {
                self.queued();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.shared.sync_throttle();
                Err(SourceError::QueueFull(self.shared.id.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(SourceError::Closed(self.shared.id.clone())),
        }
    }

    /// Queue an event, waiting for room
    pub async fn put_async(&self, event: Event, context: Option<Context>) -> Result<(), SourceError> {
        self.shared
            .tx
            .send((context, event))
            .await
            .map_err(|_| SourceError::Closed(self.shared.id.clone()))?;
        self.queued();
        Ok(())
    }

    fn queued(&self) {
        self.shared.metrics.event_received();
        self.shared.sync_throttle();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events waiting in the queue, including one held by a stopped loop
    pub fn queued_len(&self) -> usize {
        let pending = usize::from(self.shared.pending.lock().is_some());
        self.capacity - self.shared.tx.capacity() + pending
    }

    pub fn is_throttling(&self) -> bool {
        *self.shared.throttled.lock()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

async fn run(shared: Arc<Shared>, rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Item>>>, cancel: CancellationToken) {
    // A previous loop may still be unwinding after stop
    let mut rx = tokio::select! {
        _ = cancel.cancelled() => return,
        rx = rx.lock_owned() => rx,
    };

    loop {
        let pending = shared.pending.lock().take();
        let (context, event) = match pending {
            Some(item) => item,
            None => {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    item = rx.recv() => item,
                };
                let Some(item) = item else {
                    break;
                };
                shared.sync_throttle();
                item
            }
        };

        let Some(pipeline) = shared.pipeline() else {
            tracing::debug!(source = %shared.id, "pipeline dropped, internal source exiting");
            *shared.pending.lock() = Some((context, event));
            break;
        };

        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            ready = pipeline.ready_except(&shared.key) => ready,
        };
        if !ready {
            *shared.pending.lock() = Some((context, event));
            break;
        }

        match pipeline.process_now(event, context) {
            Ok(()) => shared.metrics.event_processed(),
            Err(e) => {
                shared.metrics.error();
                tracing::warn!(source = %shared.id, pipeline = %pipeline.id(), error = %e, "internal source failed to process event");
                pipeline.log().warning(format!("source '{}': {}", shared.id, e));
            }
        }
    }
}

#[async_trait]
impl Source for InternalSource {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn start(&self, pipeline: Arc<Pipeline>) {
        *self.shared.pipeline.lock() = Arc::downgrade(&pipeline);

        // Events queued while stopped may have filled the queue
        if *self.shared.throttled.lock() {
            pipeline.throttle(self.shared.key.clone(), true);
        }

        let shared = self.shared.clone();
        let rx = self.rx.clone();
        if self.task.spawn(&self.shared.id, move |cancel| run(shared, rx, cancel)) {
            self.shared.metrics.started();
            tracing::debug!(source = %self.shared.id, pipeline = %pipeline.id(), capacity = self.capacity, "internal source started");
        }
    }

    async fn stop(&self) {
        self.task.stop(&self.shared.id).await;
    }
}

impl std::fmt::Debug for InternalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalSource")
            .field("id", &self.shared.id)
            .field("capacity", &self.capacity)
            .field("queued", &self.queued_len())
            .field("throttling", &self.is_throttling())
            .finish()
    }
}
