//! Line source - one string event per line of an async reader
//!
//! Reads stdin, a file or any other `AsyncRead`. Each non-empty line is
//! processed as a JSON string with the context
//! `{"source": <id>, "line": <number>}`; line numbers start at 1 and count
//! skipped blank lines too.
//!
//! The reader outlives the loop, so a stopped source resumes where it left
//! off. End of input (or a read error) resolves [`LineSource::exhausted`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use sluice_pipeline::{Context, Pipeline, Source};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use crate::common::{MetricsSnapshot, SourceMetrics, SourceTask};

#[cfg(test)]
#[path = "line_test.rs"]
mod line_test;

type Reader = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

struct Shared {
    id: String,
    line_no: AtomicU64,
    /// Read but not yet processed when the loop stopped
    pending: Mutex<Option<(u64, String)>>,
    exhausted: CancellationToken,
    metrics: SourceMetrics,
}

pub struct LineSource {
    reader: Arc<tokio::sync::Mutex<Reader>>,
    shared: Arc<Shared>,
    task: SourceTask,
}

impl LineSource {
    pub fn new(id: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            reader: Arc::new(tokio::sync::Mutex::new(BufReader::new(reader).lines())),
            shared: Arc::new(Shared {
                id: id.into(),
                line_no: AtomicU64::new(0),
                pending: Mutex::new(None),
                exhausted: CancellationToken::new(),
                metrics: SourceMetrics::new(),
            }),
            task: SourceTask::new(),
        }
    }

    /// Read the process's standard input
    pub fn stdin(id: impl Into<String>) -> Self {
        Self::new(id, tokio::io::stdin())
    }

    /// Resolves once the input is exhausted or failed
    pub async fn exhausted(&self) {
        self.shared.exhausted.cancelled().await;
    }

    pub fn is_exhausted(&self) -> bool {
        self.shared.exhausted.is_cancelled()
    }

    /// Lines read so far
    pub fn lines_read(&self) -> u64 {
        self.shared.line_no.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

fn line_context(source: &str, line_no: u64) -> Context {
    let mut context = Context::new();
    context.insert("source".into(), Value::String(source.to_string()));
    context.insert("line".into(), json!(line_no));
    context
}

async fn run(shared: Arc<Shared>, pipeline: Arc<Pipeline>, reader: Arc<tokio::sync::Mutex<Reader>>, cancel: CancellationToken) {
    let mut lines = tokio::select! {
        _ = cancel.cancelled() => return,
        lines = reader.lock_owned() => lines,
    };

    loop {
        let pending = shared.pending.lock().take();
        let (line_no, line) = match pending {
            Some(item) => item,
            None => {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = lines.next_line() => next,
                };
                match next {
                    Ok(Some(line)) => {
                        let line_no = shared.line_no.fetch_add(1, Ordering::Relaxed) + 1;
                        if line.trim().is_empty() {
                            continue;
                        }
                        shared.metrics.event_received();
                        (line_no, line)
                    }
                    Ok(None) => {
                        tracing::info!(source = %shared.id, lines = shared.line_no.load(Ordering::Relaxed), "input exhausted");
                        shared.exhausted.cancel();
                        break;
                    }
                    Err(e) => {
                        shared.metrics.error();
                        tracing::warn!(source = %shared.id, error = %e, "failed to read line");
                        pipeline.log().warning(format!("source '{}': read failed: {}", shared.id, e));
                        shared.exhausted.cancel();
                        break;
                    }
                }
            }
        };

        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            ready = pipeline.ready() => ready,
        };
        if !ready {
            *shared.pending.lock() = Some((line_no, line));
            break;
        }

        let context = line_context(&shared.id, line_no);
        match pipeline.process_now(Value::String(line), Some(context)) {
            Ok(()) => shared.metrics.event_processed(),
            Err(e) => {
                shared.metrics.error();
                tracing::warn!(source = %shared.id, line = line_no, error = %e, "line source failed to process event");
                pipeline.log().warning(format!("source '{}': {}", shared.id, e));
            }
        }
    }
}

#[async_trait]
impl Source for LineSource {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn start(&self, pipeline: Arc<Pipeline>) {
        if self.is_exhausted() {
            tracing::debug!(source = %self.shared.id, "input exhausted, not restarting");
            return;
        }

        let shared = self.shared.clone();
        let reader = self.reader.clone();
        let pipeline_id = pipeline.id().to_string();
        if self.task.spawn(&self.shared.id, move |cancel| run(shared, pipeline, reader, cancel)) {
            self.shared.metrics.started();
            tracing::debug!(source = %self.shared.id, pipeline = %pipeline_id, "line source started");
        }
    }

    async fn stop(&self) {
        self.task.stop(&self.shared.id).await;
    }
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("id", &self.shared.id)
            .field("lines_read", &self.lines_read())
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}
