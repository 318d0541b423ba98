//! Metrics output formatters
//!
//! Formats flushed metric snapshots for human-readable or JSON output.

mod human;
mod json;

pub use human::HumanFormatter;
pub use json::JsonFormatter;

use crate::{MetricSnapshot, Tags};

/// Trait for metrics formatters
pub trait MetricsFormatter: Send + Sync {
    /// Format one line per metric
    fn format(&self, snapshots: &[MetricSnapshot]) -> Vec<String>;
}

/// Format a metric value: integers without decimals, large values with K/M suffix
pub fn format_value(value: f64) -> String {
    const K: f64 = 1000.0;
    const M: f64 = 1_000_000.0;

    if value.abs() >= M {
        format!("{:.1}M", value / M)
    } else if value.abs() >= 10.0 * K {
        format!("{:.1}K", value / K)
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.3}", value)
    }
}

/// Format tags as `k=v,k=v`
pub fn format_tags(tags: &Tags) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
