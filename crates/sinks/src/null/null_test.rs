//! Tests for the null sink

use super::NullSink;
use serde_json::json;
use sluice_pipeline::{Context, Pipeline, Sink, Stage};

#[test]
fn test_consumes_and_counts() {
    let sink = NullSink::new("null");
    let mut context = Context::new();

    for i in 0..3 {
        assert_eq!(sink.process(&mut context, json!({"i": i})).unwrap(), None);
    }

    let snapshot = sink.snapshot();
    assert_eq!(snapshot.events_received, 3);
    assert_eq!(snapshot.events_written, 3);
    assert_eq!(snapshot.bytes_written, 0);
}

#[test]
fn test_default_id() {
    assert_eq!(NullSink::default().id(), "null");
}

#[test]
fn test_metrics_handle_outlives_move() {
    let sink = NullSink::new("discard");
    let handle = sink.metrics_handle();

    let pipeline = Pipeline::builder("null-test").build().unwrap();
    pipeline.append_processor(Stage::sink(sink)).unwrap();
    pipeline.start();

    pipeline.inject(None, json!(1), 0).unwrap();
    pipeline.inject(None, json!(2), 0).unwrap();

    assert_eq!(handle.snapshot().events_received, 2);
    assert_eq!(pipeline.metrics().counter.get("event.out"), 2.0);
    assert!(pipeline.is_ready());
}
