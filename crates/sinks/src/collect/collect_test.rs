use super::*;
use serde_json::json;
use sluice_pipeline::{Pipeline, Stage};

#[test]
fn test_clones_share_buffer() {
    let sink = CollectSink::new("collect");
    let handle = sink.clone();

    let mut context = Context::new();
    context.insert("k".into(), json!("v"));
    sink.process(&mut context, json!(1)).unwrap();
    sink.process(&mut Context::new(), json!(2)).unwrap();

    assert_eq!(handle.len(), 2);
    assert_eq!(handle.events(), vec![json!(1), json!(2)]);
    assert_eq!(handle.collected()[0].context["k"], "v");
    assert_eq!(handle.snapshot().events_written, 2);
}

#[test]
fn test_take_drains() {
    let sink = CollectSink::new("collect");
    sink.process(&mut Context::new(), json!("a")).unwrap();

    assert_eq!(sink.take(), vec![json!("a")]);
    assert!(sink.is_empty());
}

#[test]
fn test_capacity_evicts_oldest() {
    let sink = CollectSink::new("collect").with_capacity(2);
    for i in 0..5 {
        sink.process(&mut Context::new(), json!(i)).unwrap();
    }
    assert_eq!(sink.events(), vec![json!(3), json!(4)]);
    assert_eq!(sink.snapshot().events_received, 5);
}

#[tokio::test]
async fn test_as_pipeline_terminal() {
    let sink = CollectSink::new("collect");
    let pipeline = Pipeline::builder("collect-test").build().unwrap();
    pipeline.append_processor(Stage::sink(sink.clone())).unwrap();
    pipeline.start();

    pipeline.process(json!({"a": 1}), None).await.unwrap();

    assert_eq!(sink.events(), vec![json!({"a": 1})]);
    assert_eq!(pipeline.metrics().counter.get("event.out"), 1.0);
}
