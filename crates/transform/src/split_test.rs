use super::*;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use sluice_pipeline::{Pipeline, Processor, Sink, Stage, StageResult};

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<Event>>>);

impl Sink for Collect {
    fn id(&self) -> &str {
        "collect"
    }

    fn process(&self, _context: &mut Context, event: Event) -> StageResult {
        self.0.lock().push(event);
        Ok(None)
    }
}

struct Pass;

impl Processor for Pass {
    fn id(&self) -> &str {
        "pass"
    }

    fn process(&self, _context: &mut Context, event: Event) -> StageResult {
        Ok(Some(event))
    }
}

fn pipeline(split: SplitGenerator) -> (Arc<Pipeline>, Collect) {
    let sink = Collect::default();
    let pipeline = Pipeline::builder("split-test").build().unwrap();
    pipeline
        .build([], [Stage::generator(split), Stage::sink(sink.clone())])
        .unwrap();
    pipeline.start();
    (pipeline, sink)
}

async fn drain(pipeline: &Pipeline) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while pipeline.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

#[test]
fn test_set_depth() {
    let pipeline = Pipeline::builder("depth").build().unwrap();
    pipeline.append_processor(Stage::processor(Pass)).unwrap();

    let mut split = SplitGenerator::new("split");
    split.set_depth(pipeline.depths() - 1);
    assert_eq!(split.depth(), 0);

    pipeline.append_processor(Stage::generator(split)).unwrap();
    assert_eq!(pipeline.depths(), 2);
}

#[tokio::test]
async fn test_split_array_event() {
    let (pipeline, sink) = pipeline(SplitGenerator::new("split"));

    pipeline.process(json!([{"n": 1}, {"n": 2}]), None).await.unwrap();
    drain(&pipeline).await;

    assert_eq!(*sink.0.lock(), vec![json!({"n": 1}), json!({"n": 2})]);
    assert!(pipeline.is_ready());
}

#[tokio::test]
async fn test_split_nested_field() {
    let (pipeline, sink) = pipeline(SplitGenerator::new("split").with_field("batch.records"));

    pipeline
        .process(json!({"host": "a", "batch": {"records": ["x", "y", "z"]}}), None)
        .await
        .unwrap();
    drain(&pipeline).await;

    assert_eq!(*sink.0.lock(), vec![json!("x"), json!("y"), json!("z")]);
}

#[tokio::test]
async fn test_keep_parent() {
    let (pipeline, sink) = pipeline(
        SplitGenerator::new("split")
            .with_field("records")
            .with_keep_parent(true),
    );

    pipeline
        .process(json!({"host": "a", "records": [1, 2]}), None)
        .await
        .unwrap();
    drain(&pipeline).await;

    assert_eq!(
        *sink.0.lock(),
        vec![
            json!({"parent": {"host": "a"}, "item": 1}),
            json!({"parent": {"host": "a"}, "item": 2}),
        ]
    );
}

#[tokio::test]
async fn test_empty_array_emits_nothing() {
    let (pipeline, sink) = pipeline(SplitGenerator::new("split"));

    pipeline.process(json!([]), None).await.unwrap();
    drain(&pipeline).await;

    assert!(sink.0.lock().is_empty());
    assert!(!pipeline.is_error());
}

#[tokio::test]
async fn test_missing_field_fails_the_future() {
    let (pipeline, _sink) = pipeline(SplitGenerator::new("split").with_field("records"));

    pipeline.process(json!({"host": "a"}), None).await.unwrap();
    drain(&pipeline).await;

    let record = pipeline.error().unwrap();
    assert_eq!(
        record.error,
        ProcessingError::InvalidEvent("field 'records' is missing".into())
    );
}

#[tokio::test]
async fn test_non_array_rejected() {
    let (pipeline, _sink) = pipeline(SplitGenerator::new("split"));

    pipeline.process(json!({"a": 1}), None).await.unwrap();
    drain(&pipeline).await;

    assert!(matches!(
        pipeline.error().unwrap().error,
        ProcessingError::InvalidEvent(_)
    ));
}
