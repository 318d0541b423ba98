use super::*;
use serde_json::json;
use sluice_pipeline::{LogLevel, Stage};
use sluice_sinks::CollectSink;
use sluice_transform::JsonParser;
use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadBuf};

fn pipeline_with(source: &Arc<LineSource>, stages: Vec<Stage>) -> Arc<Pipeline> {
    let pipeline = Pipeline::builder("line-test").build().unwrap();
    pipeline
        .build([source.clone() as Arc<dyn Source>], stages)
        .unwrap();
    pipeline
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

/// Reader that fails on first read
struct Failing;

impl AsyncRead for Failing {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
    }
}

#[tokio::test]
async fn test_lines_become_string_events() {
    let source = Arc::new(LineSource::new("lines", &b"first\n\nsecond\r\nthird"[..]));
    let sink = CollectSink::new("collect");
    let pipeline = pipeline_with(&source, vec![Stage::sink(sink.clone())]);
    pipeline.start();

    tokio::time::timeout(Duration::from_secs(2), source.exhausted())
        .await
        .unwrap();
    wait_until("three events", || sink.len() == 3).await;

    assert_eq!(sink.events(), vec![json!("first"), json!("second"), json!("third")]);
    let collected = sink.collected();
    assert_eq!(collected[0].context["source"], "lines");
    assert_eq!(collected[0].context["line"], 1);
    assert_eq!(collected[1].context["line"], 3);
    assert_eq!(collected[2].context["line"], 4);

    assert_eq!(source.lines_read(), 4);
    assert_eq!(source.snapshot().events_processed, 3);
    assert_eq!(pipeline.metrics().counter.get("event.in"), 3.0);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_json_lines_through_parser() {
    let input = "{\"user\": \"ada\"}\n[1, 2]\n";
    let source = Arc::new(LineSource::new("lines", input.as_bytes()));
    let sink = CollectSink::new("collect");
    let pipeline = pipeline_with(
        &source,
        vec![Stage::processor(JsonParser::new("parse")), Stage::sink(sink.clone())],
    );
    pipeline.start();

    wait_until("two events", || sink.len() == 2).await;
    assert_eq!(sink.events(), vec![json!({"user": "ada"}), json!([1, 2])]);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_waits_while_not_ready() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let source = Arc::new(LineSource::new("lines", reader));
    let sink = CollectSink::new("collect");
    let pipeline = pipeline_with(&source, vec![Stage::sink(sink.clone())]);
    pipeline.start();
    pipeline.throttle("downstream", true);

    writer.write_all(b"a\nb\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sink.is_empty());

    pipeline.throttle("downstream", false);
    wait_until("two events", || sink.len() == 2).await;

    pipeline.stop().await;
}

#[tokio::test]
async fn test_resumes_after_restart() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let source = Arc::new(LineSource::new("lines", reader));
    let sink = CollectSink::new("collect");
    let pipeline = pipeline_with(&source, vec![Stage::sink(sink.clone())]);
    pipeline.start();

    writer.write_all(b"one\n").await.unwrap();
    wait_until("first event", || sink.len() == 1).await;

    pipeline.stop().await;
    assert!(!source.is_running());
    writer.write_all(b"two\nthree\n").await.unwrap();
    drop(writer);

    source.restart(pipeline.clone());
    tokio::time::timeout(Duration::from_secs(2), source.exhausted())
        .await
        .unwrap();
    wait_until("all events", || sink.len() == 3).await;

    assert_eq!(sink.events(), vec![json!("one"), json!("two"), json!("three")]);
    assert_eq!(sink.collected()[2].context["line"], 3);
    assert_eq!(source.snapshot().starts, 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_no_restart_once_exhausted() {
    let source = Arc::new(LineSource::new("lines", &b"only\n"[..]));
    let sink = CollectSink::new("collect");
    let pipeline = pipeline_with(&source, vec![Stage::sink(sink.clone())]);
    pipeline.start();
    source.exhausted().await;
    wait_until("task finished", || !source.is_running()).await;

    source.restart(pipeline.clone());
    assert!(!source.is_running());
    assert_eq!(source.snapshot().starts, 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_read_error_is_logged() {
    let source = Arc::new(LineSource::new("lines", Failing));
    let pipeline = pipeline_with(&source, vec![Stage::sink(CollectSink::new("collect"))]);
    pipeline.start();

    tokio::time::timeout(Duration::from_secs(2), source.exhausted())
        .await
        .unwrap();

    assert_eq!(source.snapshot().errors, 1);
    let records = pipeline.log().records();
    assert!(
        records
            .iter()
            .any(|r| r.level == LogLevel::Warning && r.message.contains("read failed"))
    );

    pipeline.stop().await;
}
