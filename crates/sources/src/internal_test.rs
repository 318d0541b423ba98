use super::*;
use serde_json::json;
use sluice_pipeline::Stage;
use sluice_sinks::CollectSink;
use std::time::Duration;

fn pipeline_with(source: &Arc<InternalSource>) -> (Arc<Pipeline>, CollectSink) {
    let sink = CollectSink::new("collect");
    let pipeline = Pipeline::builder("internal-test").build().unwrap();
    pipeline
        .build(
            [source.clone() as Arc<dyn Source>],
            [Stage::sink(sink.clone())],
        )
        .unwrap();
    (pipeline, sink)
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn test_put_delivers_in_order() {
    let source = Arc::new(InternalSource::new("queue"));
    let (pipeline, sink) = pipeline_with(&source);
    pipeline.start();

    for i in 0..5 {
        source.put(json!(i), None).unwrap();
    }
    wait_until("five events", || sink.len() == 5).await;

    assert_eq!(sink.events(), (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    let snapshot = source.snapshot();
    assert_eq!(snapshot.events_received, 5);
    assert_eq!(snapshot.events_processed, 5);
    assert_eq!(snapshot.starts, 1);

    pipeline.stop().await;
    assert!(!source.is_running());
}

#[tokio::test]
async fn test_context_travels_with_event() {
    let source = Arc::new(InternalSource::new("queue"));
    let (pipeline, sink) = pipeline_with(&source);
    pipeline.start();

    let mut context = Context::new();
    context.insert("origin".into(), json!("test"));
    source.put(json!("x"), Some(context)).unwrap();
    wait_until("one event", || sink.len() == 1).await;

    assert_eq!(sink.collected()[0].context["origin"], "test");
    pipeline.stop().await;
}

#[tokio::test]
async fn test_full_queue_throttles_pipeline() {
    let source = Arc::new(InternalSource::with_capacity("queue", 2));
    let (pipeline, sink) = pipeline_with(&source);

    // Not started: nothing drains the queue
    source.put(json!(1), None).unwrap();
    assert!(!source.is_throttling());
    source.put(json!(2), None).unwrap();
    assert!(source.is_throttling());

    let err = source.put(json!(3), None).unwrap_err();
    assert!(matches!(err, SourceError::QueueFull(ref id) if id == "queue"));
    assert_eq!(source.queued_len(), 2);

    pipeline.start();

    wait_until("queue drained", || sink.len() == 2).await;
    wait_until("throttle released", || pipeline.is_ready()).await;
    assert!(!source.is_throttling());
    assert!(pipeline.get_throttles().is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn test_throttle_reaches_ancestor() {
    let source = Arc::new(InternalSource::with_capacity("queue", 1));
    let (pipeline, sink) = pipeline_with(&source);
    let ancestor = Pipeline::builder("ancestor").build().unwrap();
    ancestor.start();
    pipeline.link(&ancestor);

    // Keep the loop waiting so the queue stays full
    pipeline.throttle("hold", true);
    pipeline.start();
    source.put(json!(1), None).unwrap();

    assert!(source.is_throttling());
    let throttles = ancestor.get_throttles();
    assert!(throttles.contains(&ThrottleKey::from("queue")));
    assert!(throttles.contains(&ThrottleKey::from("hold")));

    pipeline.throttle("hold", false);
    wait_until("queue drained", || sink.len() == 1).await;
    wait_until("ancestor released", || ancestor.get_throttles().is_empty()).await;
    assert!(ancestor.is_ready());

    pipeline.stop().await;
}

#[tokio::test]
async fn test_other_throttle_holds_events_without_deadlock() {
    let source = Arc::new(InternalSource::with_capacity("queue", 2));
    let (pipeline, sink) = pipeline_with(&source);
    pipeline.start();
    pipeline.throttle("downstream", true);

    // The loop holds the first event while it waits
    source.put(json!(1), None).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    source.put(json!(2), None).unwrap();
    source.put(json!(3), None).unwrap();

    assert!(sink.is_empty());
    assert!(source.is_throttling());
    assert!(source.put(json!(4), None).is_err());

    pipeline.throttle("downstream", false);
    wait_until("three events", || sink.len() == 3).await;
    wait_until("ready again", || pipeline.is_ready()).await;

    pipeline.stop().await;
}

#[tokio::test]
async fn test_put_async_waits_for_room() {
    let source = Arc::new(InternalSource::with_capacity("queue", 1));
    let (pipeline, sink) = pipeline_with(&source);
    pipeline.start();

    for i in 0..10 {
        source.put_async(json!(i), None).await.unwrap();
    }
    wait_until("ten events", || sink.len() == 10).await;
    assert_eq!(source.snapshot().events_received, 10);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_restart_after_stop() {
    let source = Arc::new(InternalSource::new("queue"));
    let (pipeline, sink) = pipeline_with(&source);
    pipeline.start();
    pipeline.stop().await;
    assert!(!source.is_running());

    // Queued while stopped, delivered after the restart
    source.put(json!("late"), None).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(sink.is_empty());

    source.restart(pipeline.clone());
    wait_until("late event", || sink.len() == 1).await;
    assert_eq!(source.snapshot().starts, 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_start_twice_runs_one_loop() {
    let source = Arc::new(InternalSource::new("queue"));
    let (pipeline, _sink) = pipeline_with(&source);
    pipeline.start();
    source.start(pipeline.clone());

    assert_eq!(source.snapshot().starts, 1);
    pipeline.stop().await;
}

#[tokio::test]
async fn test_pipeline_error_pauses_loop() {
    let source = Arc::new(InternalSource::new("queue"));
    let pipeline = Pipeline::builder("errors").build().unwrap();
    let sink = CollectSink::new("collect");
    pipeline
        .build([source.clone() as Arc<dyn Source>], [Stage::sink(sink.clone())])
        .unwrap();
    pipeline.start();

    pipeline.set_error(None, None, Some(sluice_pipeline::ProcessingError::failed("x", "boom")));
    source.put(json!(1), None).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sink.is_empty());

    pipeline.set_error(None, None, None);
    wait_until("event after clear", || sink.len() == 1).await;

    pipeline.stop().await;
}

#[tokio::test]
async fn test_event_held_across_stop() {
    let source = Arc::new(InternalSource::new("queue"));
    let (pipeline, sink) = pipeline_with(&source);
    pipeline.start();
    pipeline.throttle("downstream", true);

    source.put(json!("held"), None).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    pipeline.stop().await;
    assert_eq!(source.queued_len(), 1);

    pipeline.throttle("downstream", false);
    source.restart(pipeline.clone());
    wait_until("held event", || sink.len() == 1).await;
    assert_eq!(source.queued_len(), 0);

    pipeline.stop().await;
}
