//! JSON metrics formatter
//!
//! # Example Output
//!
//! ```json
//! {"type":"metric","name":"sluice.pipeline","kind":"counter","tags":{"pipeline":"main"},"values":{"event.in":1.0}}
//! ```

use super::MetricsFormatter;
use crate::{MetricKind, MetricSnapshot, Tags, Values};
use serde::Serialize;

/// JSON metrics formatter
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct MetricJson<'a> {
    #[serde(rename = "type")]
    report_type: &'static str,
    name: &'a str,
    kind: MetricKind,
    tags: &'a Tags,
    values: &'a Values,
}

impl MetricsFormatter for JsonFormatter {
    fn format(&self, snapshots: &[MetricSnapshot]) -> Vec<String> {
        snapshots
            .iter()
            .filter_map(|snap| {
                serde_json::to_string(&MetricJson {
                    report_type: "metric",
                    name: &snap.name,
                    kind: snap.kind,
                    tags: &snap.tags,
                    values: &snap.values,
                })
                .ok()
            })
            .collect()
    }
}
