//! Pipeline registry
//!
//! Process-wide set of pipelines with two phases: `register` while wiring,
//! `finalize` to start everything. After finalize the set is frozen.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use sluice_metrics::{MetricSnapshot, MetricsService};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::snapshot::PipelineSnapshot;

#[derive(Debug)]
pub struct PipelineRegistry {
    metrics_service: Arc<MetricsService>,
    pipelines: RwLock<Vec<Arc<Pipeline>>>,
    finalized: AtomicBool,
}

impl PipelineRegistry {
    pub fn new(metrics_service: Arc<MetricsService>) -> Self {
        Self {
            metrics_service,
            pipelines: RwLock::new(Vec::new()),
            finalized: AtomicBool::new(false),
        }
    }

    /// Metrics service pipelines of this registry should share
    pub fn metrics_service(&self) -> &Arc<MetricsService> {
        &self.metrics_service
    }

    pub fn register(&self, pipeline: Arc<Pipeline>) -> Result<()> {
        if self.is_finalized() {
            return Err(PipelineError::RegistryFinalized(pipeline.id().to_string()));
        }

        let mut pipelines = self.pipelines.write();
        if pipelines.iter().any(|p| p.id() == pipeline.id()) {
            return Err(PipelineError::DuplicatePipeline(pipeline.id().to_string()));
        }
        pipelines.push(pipeline);
        Ok(())
    }

    /// Freeze the registry and start every pipeline in registration order
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        let pipelines = self.pipelines();
        info!(pipeline_count = pipelines.len(), "starting pipelines");
        for pipeline in pipelines {
            pipeline.start();
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    pub fn locate(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.read().iter().find(|p| p.id() == id).cloned()
    }

    pub fn pipelines(&self) -> Vec<Arc<Pipeline>> {
        self.pipelines.read().clone()
    }

    pub fn len(&self) -> usize {
        self.pipelines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.read().is_empty()
    }

    /// Clear the error of every pipeline in error state, returning how many
    pub fn clear_errors(&self) -> usize {
        let mut cleared = 0;
        for pipeline in self.pipelines() {
            if pipeline.is_error() {
                pipeline.set_error(None, None, None);
                cleared += 1;
            }
        }
        if cleared > 0 {
            info!(cleared, "pipeline errors cleared");
        }
        cleared
    }

    /// Flush the shared metrics service
    pub fn flush_metrics(&self) -> Vec<MetricSnapshot> {
        self.metrics_service.flush()
    }

    /// Stop every pipeline in registration order
    pub async fn stop(&self) {
        for pipeline in self.pipelines() {
            pipeline.stop().await;
        }
    }

    pub fn rest_get(&self) -> Vec<PipelineSnapshot> {
        self.pipelines().iter().map(|p| p.rest_get()).collect()
    }
}
