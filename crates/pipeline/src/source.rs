//! Source trait
//!
//! Sources own their I/O loop. `start` spawns it and returns immediately;
//! the loop pushes data with `pipeline.process(event, context).await`,
//! which waits while the pipeline is not ready. Loops that must not lose an
//! event to cancellation wait on `ready()` themselves and hand it over with
//! `process_now`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::pipeline::Pipeline;

#[async_trait]
pub trait Source: Send + Sync {
    /// Unique id within the pipeline
    fn id(&self) -> &str;

    /// Spawn the source loop feeding `pipeline`
    fn start(&self, pipeline: Arc<Pipeline>);

    /// Stop the source loop and wait for it to finish
    async fn stop(&self);

    /// Resume after a cleared error
    fn restart(&self, pipeline: Arc<Pipeline>) {
        self.start(pipeline);
    }
}
