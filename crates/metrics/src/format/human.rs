//! Human-readable metrics formatter
//!
//! # Example Output
//!
//! ```text
//! [metrics] sluice.pipeline{pipeline=main} event.drop=0 event.in=1.2K event.out=1.2K
//! [metrics] sluice.pipeline.gauge{pipeline=main} error.ratio=0 warning.ratio=0.010
//! ```

use super::{MetricsFormatter, format_tags, format_value};
use crate::MetricSnapshot;
use std::fmt::Write;

/// Human-readable metrics formatter
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter;

impl HumanFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsFormatter for HumanFormatter {
    fn format(&self, snapshots: &[MetricSnapshot]) -> Vec<String> {
        snapshots
            .iter()
            .map(|snap| {
                let mut line = format!("[metrics] {}", snap.name);
                if !snap.tags.is_empty() {
                    let _ = write!(line, "{{{}}}", format_tags(&snap.tags));
                }
                for (field, value) in &snap.values {
                    let _ = write!(line, " {}={}", field, format_value(*value));
                }
                line
            })
            .collect()
    }
}
