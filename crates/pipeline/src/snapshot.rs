//! Runtime introspection

use chrono::{DateTime, Utc};
use serde::Serialize;
use sluice_metrics::MetricSnapshot;

use crate::log::LogRecord;
use crate::stage::StageKind;

/// One stage in the topology view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessorInfo {
    pub id: String,
    #[serde(rename = "Type")]
    pub kind: StageKind,
}

/// State of a pipeline as returned by `rest_get`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineSnapshot {
    pub id: String,
    pub ready: bool,
    pub throttles: Vec<String>,
    pub sources: Vec<String>,
    /// Stage ids per depth
    pub processors: Vec<Vec<ProcessorInfo>>,
    pub metrics: Vec<MetricSnapshot>,
    pub log: Vec<LogRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_timestamp: Option<DateTime<Utc>>,
}
