//! Alerting
//!
//! Hard and soft errors both trigger an alert. Alerts of one pipeline share
//! a stable `alert_id` so repeated failures correlate into one incident.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

/// Failure details attached to an alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertData {
    /// `Kind: message`
    pub exception: String,
    /// Stringified event, empty when none
    pub event: String,
    /// Error followed by its cause chain, one per line
    pub traceback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub source: String,
    pub alert_cls: String,
    pub alert_id: String,
    pub title: String,
    pub data: AlertData,
}

/// Receives pipeline alerts
pub trait AlertService: Send + Sync {
    fn trigger(&self, alert: Alert);

    /// The incident behind `alert_id` is over
    fn resolve(&self, _alert_id: &str) {}
}

/// Alert service backed by `tracing`
///
/// The first alert of an id is logged at error level, repeats at debug
/// with their occurrence count until the id is resolved.
#[derive(Debug, Default)]
pub struct LogAlertService {
    occurrences: Mutex<HashMap<String, u64>>,
}

impl LogAlertService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts seen for `alert_id` since it was last resolved
    pub fn occurrences(&self, alert_id: &str) -> u64 {
        self.occurrences.lock().get(alert_id).copied().unwrap_or(0)
    }
}

impl AlertService for LogAlertService {
    fn trigger(&self, alert: Alert) {
        let count = {
            let mut occurrences = self.occurrences.lock();
            let count = occurrences.entry(alert.alert_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if count == 1 {
            error!(
                source = %alert.source,
                alert_cls = %alert.alert_cls,
                alert_id = %alert.alert_id,
                exception = %alert.data.exception,
                event = %alert.data.event,
                "{}",
                alert.title
            );
        } else {
            debug!(
                alert_id = %alert.alert_id,
                occurrence = count,
                exception = %alert.data.exception,
                "{}",
                alert.title
            );
        }
    }

    fn resolve(&self, alert_id: &str) {
        if let Some(count) = self.occurrences.lock().remove(alert_id) {
            info!(alert_id = %alert_id, occurrences = count, "alert resolved");
        }
    }
}
