//! Metrics storage
//!
//! The service owns every registered metric and runs the flush cycle:
//! hooks first, so derived values are computed from live counters, then
//! each metric closes its window.

use crate::metric::{Counter, DutyCycle, EpsCounter, Gauge, Metric, MetricSnapshot, Tags};
use crate::{MetricsError, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(test)]
#[path = "service_test.rs"]
mod tests;

/// Length of the window being flushed
#[derive(Debug, Clone, Copy)]
pub struct FlushWindow {
    pub elapsed: Duration,
}

/// Callback run before every flush
pub type FlushHook = Arc<dyn Fn(&FlushWindow) + Send + Sync>;

/// Handle for removing a flush hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Shared registry of named, tagged metrics
pub struct MetricsService {
    metrics: RwLock<Vec<Arc<dyn Metric>>>,
    hooks: Mutex<Vec<(HookId, FlushHook)>>,
    next_hook: AtomicU64,
    last_flush: Mutex<Instant>,
}

impl std::fmt::Debug for MetricsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsService")
            .field("metrics", &self.metrics.read().len())
            .field("hooks", &self.hooks.lock().len())
            .finish()
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsService {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
            next_hook: AtomicU64::new(0),
            last_flush: Mutex::new(Instant::now()),
        }
    }

    /// Create and register a counter
    pub fn create_counter(
        &self,
        name: &str,
        tags: Tags,
        fields: &[&str],
        reset: bool,
    ) -> Result<Arc<Counter>> {
        self.insert(Arc::new(Counter::new(name, tags, fields, reset)))
    }

    /// Create and register an EPS counter
    pub fn create_eps_counter(&self, name: &str, tags: Tags, fields: &[&str]) -> Result<Arc<EpsCounter>> {
        self.insert(Arc::new(EpsCounter::new(name, tags, fields)))
    }

    /// Create and register a gauge
    pub fn create_gauge(&self, name: &str, tags: Tags, fields: &[&str]) -> Result<Arc<Gauge>> {
        self.insert(Arc::new(Gauge::new(name, tags, fields)))
    }

    /// Create and register a duty cycle
    pub fn create_duty_cycle(&self, name: &str, tags: Tags, fields: &[&str]) -> Result<Arc<DutyCycle>> {
        self.insert(Arc::new(DutyCycle::new(name, tags, fields)))
    }

    fn insert<M: Metric + 'static>(&self, metric: Arc<M>) -> Result<Arc<M>> {
        let mut metrics = self.metrics.write();
        if metrics
            .iter()
            .any(|m| m.name() == metric.name() && m.tags() == metric.tags())
        {
            return Err(MetricsError::duplicate(metric.name(), metric.tags()));
        }
        metrics.push(metric.clone());
        Ok(metric)
    }

    /// Remove the metric registered under `name` and `tags`
    pub fn remove(&self, name: &str, tags: &Tags) -> Result<()> {
        let mut metrics = self.metrics.write();
        let before = metrics.len();
        metrics.retain(|m| !(m.name() == name && m.tags() == tags));
        if metrics.len() == before {
            return Err(MetricsError::not_found(name, tags));
        }
        Ok(())
    }

    /// Remove every metric whose tag `key` equals `value`, returning how many
    pub fn remove_tagged(&self, key: &str, value: &str) -> usize {
        let mut metrics = self.metrics.write();
        let before = metrics.len();
        metrics.retain(|m| m.tags().get(key).map(String::as_str) != Some(value));
        before - metrics.len()
    }

    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    /// Register a hook run before every flush
    pub fn on_flush<F>(&self, hook: F) -> HookId
    where
        F: Fn(&FlushWindow) + Send + Sync + 'static,
    {
        let id = HookId(self.next_hook.fetch_add(1, Ordering::Relaxed));
        self.hooks.lock().push((id, Arc::new(hook)));
        id
    }

    /// Remove a flush hook; false when it was not registered
    pub fn remove_hook(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hid, _)| *hid != id);
        hooks.len() != before
    }

    /// Flush with the window measured since the previous flush
    pub fn flush(&self) -> Vec<MetricSnapshot> {
        let elapsed = {
            let mut last = self.last_flush.lock();
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };
        self.flush_window(elapsed)
    }

    /// Flush with an explicit window length
    pub fn flush_window(&self, elapsed: Duration) -> Vec<MetricSnapshot> {
        let window = FlushWindow { elapsed };

        // Hooks may create or read metrics; run them without holding our locks
        let hooks: Vec<FlushHook> = self.hooks.lock().iter().map(|(_, h)| h.clone()).collect();
        for hook in hooks {
            hook(&window);
        }

        let metrics: Vec<Arc<dyn Metric>> = self.metrics.read().clone();
        metrics
            .iter()
            .map(|m| MetricSnapshot {
                name: m.name().to_string(),
                tags: m.tags().clone(),
                kind: m.kind(),
                values: m.flush(elapsed),
            })
            .collect()
    }

    /// Current values of every metric, without flushing
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.metrics.read().iter().map(|m| m.snapshot()).collect()
    }

    /// Current values of metrics whose tag `key` equals `value`
    pub fn snapshot_tagged(&self, key: &str, value: &str) -> Vec<MetricSnapshot> {
        self.metrics
            .read()
            .iter()
            .filter(|m| m.tags().get(key).map(String::as_str) == Some(value))
            .map(|m| m.snapshot())
            .collect()
    }
}
