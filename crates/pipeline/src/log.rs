//! Per-pipeline log ring
//!
//! Keeps the last records a pipeline (or its sources) logged, for
//! introspection. Warning and error records bump the pipeline counters.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sluice_metrics::Counter;

/// Records kept per pipeline
pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// ISO-8601 UTC
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded log of recent pipeline records
#[derive(Debug)]
pub struct PipelineLog {
    pipeline: String,
    counter: Arc<Counter>,
    records: Mutex<VecDeque<LogRecord>>,
}

impl PipelineLog {
    pub fn new(pipeline: impl Into<String>, counter: Arc<Counter>) -> Self {
        Self {
            pipeline: pipeline.into(),
            counter,
            records: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
        }
    }

    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(pipeline = %self.pipeline, "{}", message),
            LogLevel::Info => tracing::info!(pipeline = %self.pipeline, "{}", message),
            LogLevel::Warning => {
                self.counter.add("warning", 1.0);
                tracing::warn!(pipeline = %self.pipeline, "{}", message);
            }
            LogLevel::Error => {
                self.counter.add("error", 1.0);
                tracing::error!(pipeline = %self.pipeline, "{}", message);
            }
        }

        let mut records = self.records.lock();
        if records.len() == LOG_CAPACITY {
            records.pop_front();
        }
        records.push_back(LogRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            message,
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.record(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.record(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message);
    }

    /// Oldest first
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
