//! JSON codec stages
//!
//! `JsonParser` turns raw string events into structured JSON values and
//! `JsonSerializer` does the reverse, typically right before a sink that
//! writes text.
//!
//! ```text
//! "{\"a\":1}" ──► [JsonParser] ──► {"a": 1} ──► [JsonSerializer] ──► "{\"a\":1}"
//! ```
//!
//! Parse failures surface as `ProcessingError::Parse` so an error handler can
//! classify malformed input as soft.

use serde_json::Value;
use sluice_pipeline::{Context, Event, ProcessingError, Processor, StageResult};

#[cfg(test)]
#[path = "json_test.rs"]
mod tests;

/// Parses string events as JSON
#[derive(Debug, Clone)]
pub struct JsonParser {
    id: String,
    passthrough: bool,
}

impl JsonParser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            passthrough: false,
        }
    }

    /// Forward non-string events unchanged instead of rejecting them
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }
}

impl Processor for JsonParser {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self, _context: &mut Context, event: Event) -> StageResult {
        match event {
            Value::String(raw) => serde_json::from_str(raw.trim())
                .map(Some)
                .map_err(|e| ProcessingError::Parse(e.to_string())),
            other if self.passthrough => Ok(Some(other)),
            other => Err(ProcessingError::InvalidEvent(format!(
                "expected a string, got {}",
                type_name(&other)
            ))),
        }
    }
}

/// Serializes events into JSON strings
#[derive(Debug, Clone)]
pub struct JsonSerializer {
    id: String,
    pretty: bool,
}

impl JsonSerializer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pretty: false,
        }
    }

    /// Indent the output
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Processor for JsonSerializer {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self, _context: &mut Context, event: Event) -> StageResult {
        let text = if self.pretty {
            serde_json::to_string_pretty(&event)
        } else {
            serde_json::to_string(&event)
        }
        .map_err(|e| ProcessingError::failed(&self.id, e))?;
        Ok(Some(Value::String(text)))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
