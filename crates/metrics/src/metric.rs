//! Metric primitives
//!
//! Every metric is identified by a name plus a tag set and carries a small
//! map of named `f64` fields (`event.in`, `eps.out`, `ready`, ...).

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};

#[cfg(test)]
#[path = "metric_test.rs"]
mod tests;

/// Metric tags, ordered for stable output
pub type Tags = BTreeMap<String, String>;

/// Named metric fields
pub type Values = BTreeMap<String, f64>;

/// Build a tag set from key/value pairs
pub fn tags<I, K, V>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn init_values(fields: &[&str]) -> Values {
    fields.iter().map(|f| (f.to_string(), 0.0)).collect()
}

/// Metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Eps,
    Gauge,
    DutyCycle,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Eps => "eps",
            Self::Gauge => "gauge",
            Self::DutyCycle => "duty_cycle",
        }
    }
}

/// Point-in-time view of a metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub name: String,
    pub tags: Tags,
    pub kind: MetricKind,
    pub values: Values,
}

impl MetricSnapshot {
    /// Value of a field, 0 when absent
    pub fn get(&self, field: &str) -> f64 {
        self.values.get(field).copied().unwrap_or(0.0)
    }
}

/// Common behaviour of all metrics stored in the service
pub trait Metric: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn tags(&self) -> &Tags;

    fn kind(&self) -> MetricKind;

    /// Current values without side effects
    fn values(&self) -> Values;

    /// Close the flush window of length `window`, returning the reported
    /// values and resetting whatever the metric resets
    fn flush(&self, window: Duration) -> Values;

    fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            name: self.name().to_string(),
            tags: self.tags().clone(),
            kind: self.kind(),
            values: self.values(),
        }
    }
}

/// Monotonic counter with optional reset on flush
#[derive(Debug)]
pub struct Counter {
    name: String,
    tags: Tags,
    init: Values,
    reset: bool,
    values: Mutex<Values>,
}

impl Counter {
    pub fn new(name: impl Into<String>, tags: Tags, fields: &[&str], reset: bool) -> Self {
        let init = init_values(fields);
        Self {
            name: name.into(),
            tags,
            values: Mutex::new(init.clone()),
            init,
            reset,
        }
    }

    /// Add `value` to `field`, creating the field when missing
    pub fn add(&self, field: &str, value: f64) {
        let mut values = self.values.lock();
        match values.get_mut(field) {
            Some(v) => *v += value,
            None => {
                values.insert(field.to_string(), value);
            }
        }
    }

    pub fn sub(&self, field: &str, value: f64) {
        self.add(field, -value);
    }

    pub fn get(&self, field: &str) -> f64 {
        self.values.lock().get(field).copied().unwrap_or(0.0)
    }

    /// Restore initial values
    pub fn reset(&self) {
        *self.values.lock() = self.init.clone();
    }

    pub fn resets_on_flush(&self) -> bool {
        self.reset
    }
}

impl Metric for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Counter
    }

    fn values(&self) -> Values {
        self.values.lock().clone()
    }

    fn flush(&self, _window: Duration) -> Values {
        let mut values = self.values.lock();
        let out = values.clone();
        if self.reset {
            *values = self.init.clone();
        }
        out
    }
}

/// Events-per-second counter
///
/// Counts during a flush window; on flush the counts are divided by the
/// window length and become the reported values until the next flush.
#[derive(Debug)]
pub struct EpsCounter {
    name: String,
    tags: Tags,
    init: Values,
    counts: Mutex<Values>,
    rates: Mutex<Values>,
}

impl EpsCounter {
    pub fn new(name: impl Into<String>, tags: Tags, fields: &[&str]) -> Self {
        let init = init_values(fields);
        Self {
            name: name.into(),
            tags,
            counts: Mutex::new(init.clone()),
            rates: Mutex::new(init.clone()),
            init,
        }
    }

    pub fn add(&self, field: &str, value: f64) {
        let mut counts = self.counts.lock();
        *counts.entry(field.to_string()).or_insert(0.0) += value;
    }

    /// Count accumulated in the current window
    pub fn count(&self, field: &str) -> f64 {
        self.counts.lock().get(field).copied().unwrap_or(0.0)
    }

    /// Rate computed at the last flush
    pub fn rate(&self, field: &str) -> f64 {
        self.rates.lock().get(field).copied().unwrap_or(0.0)
    }
}

impl Metric for EpsCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Eps
    }

    fn values(&self) -> Values {
        self.rates.lock().clone()
    }

    fn flush(&self, window: Duration) -> Values {
        let secs = window.as_secs_f64();
        let counts = std::mem::replace(&mut *self.counts.lock(), self.init.clone());
        let rates: Values = counts
            .into_iter()
            .map(|(k, v)| (k, if secs > 0.0 { v / secs } else { 0.0 }))
            .collect();
        *self.rates.lock() = rates.clone();
        rates
    }
}

/// Last-value gauge, never reset
#[derive(Debug)]
pub struct Gauge {
    name: String,
    tags: Tags,
    values: Mutex<Values>,
}

impl Gauge {
    pub fn new(name: impl Into<String>, tags: Tags, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            tags,
            values: Mutex::new(init_values(fields)),
        }
    }

    pub fn set(&self, field: &str, value: f64) {
        self.values.lock().insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> f64 {
        self.values.lock().get(field).copied().unwrap_or(0.0)
    }
}

impl Metric for Gauge {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn values(&self) -> Values {
        self.values.lock().clone()
    }

    fn flush(&self, _window: Duration) -> Values {
        self.values()
    }
}

#[derive(Debug)]
struct DutyState {
    on: bool,
    since: Instant,
    on_time: Duration,
}

#[derive(Debug)]
struct DutyInner {
    window_start: Instant,
    fields: BTreeMap<String, DutyState>,
    last: Values,
}

/// Fraction of each flush window a boolean field spent switched on
#[derive(Debug)]
pub struct DutyCycle {
    name: String,
    tags: Tags,
    inner: Mutex<DutyInner>,
}

impl DutyCycle {
    pub fn new(name: impl Into<String>, tags: Tags, fields: &[&str]) -> Self {
        let now = Instant::now();
        let states = fields
            .iter()
            .map(|f| {
                (
                    f.to_string(),
                    DutyState {
                        on: false,
                        since: now,
                        on_time: Duration::ZERO,
                    },
                )
            })
            .collect();
        Self {
            name: name.into(),
            tags,
            inner: Mutex::new(DutyInner {
                window_start: now,
                fields: states,
                last: init_values(fields),
            }),
        }
    }

    /// Switch a field on or off; repeated values are ignored
    pub fn set(&self, field: &str, on: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let state = inner
            .fields
            .entry(field.to_string())
            .or_insert_with(|| DutyState {
                on: false,
                since: now,
                on_time: Duration::ZERO,
            });
        if state.on == on {
            return;
        }
        if state.on {
            state.on_time += now.saturating_duration_since(state.since);
        }
        state.on = on;
        state.since = now;
    }

    pub fn is_on(&self, field: &str) -> bool {
        self.inner
            .lock()
            .fields
            .get(field)
            .is_some_and(|s| s.on)
    }
}

impl Metric for DutyCycle {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn kind(&self) -> MetricKind {
        MetricKind::DutyCycle
    }

    fn values(&self) -> Values {
        self.inner.lock().last.clone()
    }

    fn flush(&self, _window: Duration) -> Values {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let elapsed = now.saturating_duration_since(inner.window_start);
        let mut ratios = Values::new();
        for (field, state) in inner.fields.iter_mut() {
            if state.on {
                state.on_time += now.saturating_duration_since(state.since);
            }
            let ratio = if elapsed.is_zero() {
                if state.on { 1.0 } else { 0.0 }
            } else {
                (state.on_time.as_secs_f64() / elapsed.as_secs_f64()).min(1.0)
            };
            ratios.insert(field.clone(), ratio);
            state.on_time = Duration::ZERO;
            state.since = now;
        }
        inner.window_start = now;
        inner.last = ratios.clone();
        ratios
    }
}
