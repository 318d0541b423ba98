//! Lifecycle PubSub
//!
//! Every pipeline publishes its lifecycle transitions on a broadcast
//! channel. Publishing never blocks; slow subscribers lag and skip.

use tokio::sync::broadcast;

/// Default broadcast buffer per pipeline
pub const DEFAULT_PUBSUB_CAPACITY: usize = 64;

/// Lifecycle topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Start,
    Stop,
    Ready,
    NotReady,
    Error,
    Warning,
    ClearError,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "bspump.pipeline.start!",
            Self::Stop => "bspump.pipeline.stop!",
            Self::Ready => "bspump.pipeline.ready!",
            Self::NotReady => "bspump.pipeline.not_ready!",
            Self::Error => "bspump.pipeline.error!",
            Self::Warning => "bspump.pipeline.warning!",
            Self::ClearError => "bspump.pipeline.clear_error!",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published lifecycle message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Topic,
    pub pipeline: String,
}

/// Broadcast bus for lifecycle messages
#[derive(Debug, Clone)]
pub struct PubSub {
    tx: broadcast::Sender<Message>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new(DEFAULT_PUBSUB_CAPACITY)
    }
}

impl PubSub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a message, returning how many subscribers received it
    pub fn publish(&self, topic: Topic, pipeline: &str) -> usize {
        tracing::trace!(topic = %topic, pipeline = %pipeline, "publish");
        self.tx
            .send(Message {
                topic,
                pipeline: pipeline.to_string(),
            })
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::Ready.as_str(), "bspump.pipeline.ready!");
        assert_eq!(Topic::NotReady.as_str(), "bspump.pipeline.not_ready!");
        assert_eq!(Topic::ClearError.to_string(), "bspump.pipeline.clear_error!");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = PubSub::default();
        assert_eq!(bus.publish(Topic::Start, "p"), 0);
    }

    #[tokio::test]
    async fn test_subscribe_receives() {
        let bus = PubSub::new(4);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(bus.publish(Topic::Error, "main"), 1);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, Topic::Error);
        assert_eq!(msg.pipeline, "main");
    }
}
