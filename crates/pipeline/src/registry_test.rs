//! Registry tests

use std::sync::Arc;

use serde_json::json;
use sluice_metrics::MetricsService;

use crate::{Context, Event, Pipeline, PipelineError, PipelineRegistry, ProcessingError, Sink, Stage, StageResult};

struct Consume;

impl Sink for Consume {
    fn id(&self) -> &str {
        "consume"
    }

    fn process(&self, _context: &mut Context, _event: Event) -> StageResult {
        Ok(None)
    }
}

fn registry() -> PipelineRegistry {
    PipelineRegistry::new(Arc::new(MetricsService::new()))
}

fn pipeline_in(registry: &PipelineRegistry, id: &str) -> Arc<Pipeline> {
    let pipeline = Pipeline::builder(id)
        .metrics_service(registry.metrics_service().clone())
        .build()
        .unwrap();
    pipeline.append_processor(Stage::sink(Consume)).unwrap();
    pipeline
}

#[test]
fn test_register_and_locate() {
    let registry = registry();
    assert!(registry.is_empty());

    registry.register(pipeline_in(&registry, "a")).unwrap();
    registry.register(pipeline_in(&registry, "b")).unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.locate("b").unwrap().id(), "b");
    assert!(registry.locate("c").is_none());

    let ids: Vec<String> = registry.pipelines().iter().map(|p| p.id().to_string()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn test_duplicate_rejected() {
    let registry = registry();
    let first = pipeline_in(&registry, "a");
    registry.register(first.clone()).unwrap();

    let err = registry.register(first).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicatePipeline(id) if id == "a"));
}

#[test]
fn test_finalize_starts_and_freezes() {
    let registry = registry();
    let a = pipeline_in(&registry, "a");
    registry.register(a.clone()).unwrap();
    assert!(!a.is_ready());

    registry.finalize();
    assert!(registry.is_finalized());
    assert!(a.is_ready());

    // Idempotent
    registry.finalize();

    let err = registry.register(pipeline_in(&registry, "late")).unwrap_err();
    assert!(matches!(err, PipelineError::RegistryFinalized(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_clear_errors() {
    let registry = registry();
    let a = pipeline_in(&registry, "a");
    let b = pipeline_in(&registry, "b");
    registry.register(a.clone()).unwrap();
    registry.register(b.clone()).unwrap();
    registry.finalize();

    a.set_error(None, Some(json!(1)), Some(ProcessingError::InvalidEvent("x".into())));
    assert!(!a.is_ready());

    assert_eq!(registry.clear_errors(), 1);
    assert!(a.is_ready());
    assert!(b.is_ready());
    assert_eq!(registry.clear_errors(), 0);
}

#[tokio::test]
async fn test_flush_metrics_covers_all_pipelines() {
    let registry = registry();
    let a = pipeline_in(&registry, "a");
    let b = pipeline_in(&registry, "b");
    registry.register(a.clone()).unwrap();
    registry.register(b.clone()).unwrap();
    registry.finalize();

    a.process(json!(1), None).await.unwrap();
    b.process(json!(2), None).await.unwrap();
    b.process(json!(3), None).await.unwrap();

    let snapshots = registry.flush_metrics();
    let event_in = |pipeline: &str| {
        snapshots
            .iter()
            .find(|s| s.name == "sluice.pipeline" && s.tags.get("pipeline").map(String::as_str) == Some(pipeline))
            .map(|s| s.get("event.in"))
            .unwrap()
    };
    assert_eq!(event_in("a"), 1.0);
    assert_eq!(event_in("b"), 2.0);
}

#[tokio::test]
async fn test_stop_and_rest_get() {
    let registry = registry();
    registry.register(pipeline_in(&registry, "a")).unwrap();
    registry.register(pipeline_in(&registry, "b")).unwrap();
    registry.finalize();

    let snapshots = registry.rest_get();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|s| s.ready));

    registry.stop().await;
}
