//! Tests for the stdout sink

use super::*;
use serde_json::json;

/// Writer whose output the test can read back
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails
struct Broken;

impl Write for Broken {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture(config: StdoutConfig) -> (StdoutSink, SharedBuf) {
    let buf = SharedBuf::default();
    (StdoutSink::with_writer("stdout", config, buf.clone()), buf)
}

#[test]
fn test_compact_lines() {
    let (sink, buf) = capture(StdoutConfig::default());
    let mut context = Context::new();

    sink.process(&mut context, json!({"a": 1})).unwrap();
    sink.process(&mut context, json!([1, 2])).unwrap();

    assert_eq!(buf.text(), "{\"a\":1}\n[1,2]\n");
    let snapshot = sink.snapshot();
    assert_eq!(snapshot.events_received, 2);
    assert_eq!(snapshot.events_written, 2);
    assert_eq!(snapshot.bytes_written, 14);
}

#[test]
fn test_pretty() {
    let (sink, buf) = capture(StdoutConfig::pretty());
    sink.process(&mut Context::new(), json!({"a": 1})).unwrap();
    assert_eq!(buf.text(), "{\n  \"a\": 1\n}\n");
}

#[test]
fn test_raw_strings() {
    let (sink, buf) = capture(StdoutConfig::default());
    sink.process(&mut Context::new(), json!("plain line")).unwrap();
    assert_eq!(buf.text(), "plain line\n");

    let quoted = StdoutConfig {
        raw_strings: false,
        ..StdoutConfig::default()
    };
    let (sink, buf) = capture(quoted);
    sink.process(&mut Context::new(), json!("plain line")).unwrap();
    assert_eq!(buf.text(), "\"plain line\"\n");
}

#[test]
fn test_show_context() {
    let (sink, buf) = capture(StdoutConfig::with_context());
    let mut context = Context::new();
    context.insert("source".into(), json!("stdin"));

    sink.process(&mut context, json!({"a": 1})).unwrap();
    assert_eq!(buf.text(), "{\"source\":\"stdin\"} {\"a\":1}\n");
}

#[test]
fn test_write_error_is_processing_error() {
    let sink = StdoutSink::with_writer("stdout", StdoutConfig::default(), Broken);
    let err = sink.process(&mut Context::new(), json!(1)).unwrap_err();

    assert!(matches!(err, ProcessingError::Failed { ref processor, .. } if processor == "stdout"));
    assert_eq!(sink.snapshot().write_errors, 1);
    assert_eq!(sink.snapshot().events_written, 0);
}

#[test]
fn test_config_from_json() {
    let config: StdoutConfig =
        serde_json::from_value(json!({"format": "pretty", "show_context": true})).unwrap();
    assert_eq!(config.format, StdoutFormat::Pretty);
    assert!(config.show_context);
    assert!(config.raw_strings);
}
