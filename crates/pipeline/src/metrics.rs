//! Pipeline and processor metrics
//!
//! Every pipeline registers four metrics tagged with its id; every stage
//! adds three more tagged with the pipeline and processor ids.
//!
//! | Metric | Fields |
//! |--------|--------|
//! | `sluice.pipeline` | `event.in`, `event.out`, `event.drop`, `warning`, `error` |
//! | `sluice.pipeline.eps` | `eps.in`, `eps.out`, `eps.drop`, `warning`, `error` |
//! | `sluice.pipeline.gauge` | `warning.ratio`, `error.ratio` |
//! | `sluice.pipeline.dutycycle` | `ready` |
//! | `sluice.pipeline.processor` | `event.in`, `event.out`, `event.drop` |
//! | `sluice.pipeline.profiler` | `duration`, `run` |
//! | `sluice.pipeline.eps_processor` | `eps.in`, `eps.out`, `eps.drop` |

use std::sync::Arc;
use std::time::Duration;

use sluice_metrics::{
    Counter, DutyCycle, EpsCounter, FlushWindow, Gauge, MetricsError, MetricsService, Tags, tags,
};

pub const PIPELINE_COUNTER: &str = "sluice.pipeline";
pub const PIPELINE_EPS: &str = "sluice.pipeline.eps";
pub const PIPELINE_GAUGE: &str = "sluice.pipeline.gauge";
pub const PIPELINE_DUTY_CYCLE: &str = "sluice.pipeline.dutycycle";
pub const PROCESSOR_COUNTER: &str = "sluice.pipeline.processor";
pub const PROCESSOR_PROFILER: &str = "sluice.pipeline.profiler";
pub const PROCESSOR_EPS: &str = "sluice.pipeline.eps_processor";

/// Pipeline-wide metric handles
#[derive(Debug)]
pub struct PipelineMetrics {
    pub counter: Arc<Counter>,
    pub eps: Arc<EpsCounter>,
    pub gauge: Arc<Gauge>,
    pub duty: Arc<DutyCycle>,
}

impl PipelineMetrics {
    pub(crate) fn register(service: &MetricsService, pipeline: &str) -> Result<Self, MetricsError> {
        let t = || tags([("pipeline", pipeline)]);
        Ok(Self {
            counter: service.create_counter(
                PIPELINE_COUNTER,
                t(),
                &["event.in", "event.out", "event.drop", "warning", "error"],
                true,
            )?,
            eps: service.create_eps_counter(
                PIPELINE_EPS,
                t(),
                &["eps.in", "eps.out", "eps.drop", "warning", "error"],
            )?,
            gauge: service.create_gauge(PIPELINE_GAUGE, t(), &["warning.ratio", "error.ratio"])?,
            duty: service.create_duty_cycle(PIPELINE_DUTY_CYCLE, t(), &["ready"])?,
        })
    }

    #[inline]
    pub(crate) fn record_in(&self) {
        self.counter.add("event.in", 1.0);
        self.eps.add("eps.in", 1.0);
    }

    #[inline]
    pub(crate) fn record_out(&self) {
        self.counter.add("event.out", 1.0);
        self.eps.add("eps.out", 1.0);
    }

    #[inline]
    pub(crate) fn record_drop(&self) {
        self.counter.add("event.drop", 1.0);
        self.eps.add("eps.drop", 1.0);
    }

    pub(crate) fn record_warning(&self) {
        self.counter.add("warning", 1.0);
        self.eps.add("warning", 1.0);
    }

    pub(crate) fn record_error(&self) {
        self.counter.add("error", 1.0);
        self.eps.add("error", 1.0);
    }

    /// Warning and error ratios of the closing window; 0 without input
    pub(crate) fn update_ratios(&self) {
        let input = self.counter.get("event.in");
        if input == 0.0 {
            self.gauge.set("warning.ratio", 0.0);
            self.gauge.set("error.ratio", 0.0);
            return;
        }
        self.gauge.set("warning.ratio", self.counter.get("warning") / input);
        self.gauge.set("error.ratio", self.counter.get("error") / input);
    }
}

/// Per-stage metric handles
#[derive(Debug)]
pub struct ProcessorMetrics {
    tags: Tags,
    pub counter: Arc<Counter>,
    pub profiler: Arc<Counter>,
    pub eps: Arc<Gauge>,
}

impl ProcessorMetrics {
    pub(crate) fn register(
        service: &MetricsService,
        pipeline: &str,
        processor: &str,
        reset_profiler: bool,
    ) -> Result<Self, MetricsError> {
        let t = tags([("pipeline", pipeline), ("processor", processor)]);

        let counter = service.create_counter(
            PROCESSOR_COUNTER,
            t.clone(),
            &["event.in", "event.out", "event.drop"],
            true,
        )?;
        let profiler = match service.create_counter(
            PROCESSOR_PROFILER,
            t.clone(),
            &["duration", "run"],
            reset_profiler,
        ) {
            Ok(p) => p,
            Err(e) => {
                let _ = service.remove(PROCESSOR_COUNTER, &t);
                return Err(e);
            }
        };
        let eps = match service.create_gauge(PROCESSOR_EPS, t.clone(), &["eps.in", "eps.out", "eps.drop"]) {
            Ok(g) => g,
            Err(e) => {
                let _ = service.remove(PROCESSOR_COUNTER, &t);
                let _ = service.remove(PROCESSOR_PROFILER, &t);
                return Err(e);
            }
        };

        Ok(Self {
            tags: t,
            counter,
            profiler,
            eps,
        })
    }

    pub(crate) fn unregister(&self, service: &MetricsService) {
        for name in [PROCESSOR_COUNTER, PROCESSOR_PROFILER, PROCESSOR_EPS] {
            let _ = service.remove(name, &self.tags);
        }
    }

    #[inline]
    pub(crate) fn record_run(&self, elapsed: Duration) {
        self.counter.add("event.out", 1.0);
        self.profiler.add("run", 1.0);
        self.profiler.add("duration", elapsed.as_secs_f64());
    }

    /// Rates of the closing window from the counter deltas
    pub(crate) fn update_eps(&self, window: &FlushWindow) {
        let secs = window.elapsed.as_secs_f64();
        for (counter_field, eps_field) in [
            ("event.in", "eps.in"),
            ("event.out", "eps.out"),
            ("event.drop", "eps.drop"),
        ] {
            let rate = if secs > 0.0 {
                ((self.counter.get(counter_field) / secs) * 1000.0).round() / 1000.0
            } else {
                0.0
            };
            self.eps.set(eps_field, rate);
        }
    }
}
