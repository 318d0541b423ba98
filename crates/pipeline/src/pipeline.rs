//! Pipeline - depth-indexed event routing
//!
//! A `Pipeline` owns its sources, a list of depths (each an ordered list of
//! stages) and an optional sink fallback table. Events enter at depth 0 via
//! `process`; generators re-enter deeper depths via `inject`.
//!
//! ```text
//!              ┌───────────── depth 0 ─────────────┐     ┌──── depth 1 ────┐
//! [Source] ──► │ Processor ──► Processor ──► Generator ──► │ Processor ──► Sink │
//!              └───────────────────────────────────┘ task└──────────────────┘
//! ```
//!
//! # Readiness
//!
//! `ready == error.is_none() && throttles.is_empty()`, re-evaluated whenever
//! either changes. `process` waits for readiness, `inject` never does.
//!
//! # Errors
//!
//! Failures at depth 0 are classified locally through `set_error`. Failures
//! deeper bubble to the generator future and reach `set_error` through the
//! completion path of `ensure_future`.

use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use sluice_config::PipelineConfig;
use sluice_metrics::{FlushWindow, HookId, MetricsService};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alert::{Alert, AlertData, AlertService, LogAlertService};
use crate::error::{PipelineError, ProcessingError, Result};
use crate::event::{Context, Event, merge_context};
use crate::handler::{ErrorHandler, StopOnErrors};
use crate::log::PipelineLog;
use crate::metrics::{PipelineMetrics, ProcessorMetrics};
use crate::pubsub::{PubSub, Topic};
use crate::snapshot::{PipelineSnapshot, ProcessorInfo};
use crate::source::Source;
use crate::stage::{Injector, Sink, Stage, StageKind};
use crate::throttle::ThrottleKey;

/// Predicate selecting a fallback sink
pub type SinkPredicate = Box<dyn Fn(&Event) -> bool + Send + Sync>;

type Topology = Vec<Vec<Arc<Slot>>>;

struct Slot {
    stage: Stage,
    metrics: ProcessorMetrics,
}

struct SinkRoute {
    predicate: SinkPredicate,
    sink: Box<dyn Sink>,
}

/// The live error of a pipeline in error state
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub context: Context,
    pub event: Option<Event>,
    pub error: ProcessingError,
    pub timestamp: DateTime<Utc>,
}

/// What the last `inject` call was working on
pub(crate) struct Breadcrumb {
    context: Context,
    event: Event,
    timestamp: DateTime<Utc>,
}

/// Last breadcrumb left by one generator task
pub(crate) type Trail = Arc<Mutex<Option<Arc<Breadcrumb>>>>;

#[derive(Default)]
struct State {
    error: Option<ErrorRecord>,
    breadcrumb: Option<Arc<Breadcrumb>>,
    throttles: BTreeSet<ThrottleKey>,
    ancestors: Vec<Weak<Pipeline>>,
}

/// Handle to a stage in the topology
#[derive(Clone)]
pub struct ProcessorHandle {
    slot: Arc<Slot>,
}

impl ProcessorHandle {
    pub fn id(&self) -> &str {
        self.slot.stage.id()
    }

    pub fn kind(&self) -> StageKind {
        self.slot.stage.kind()
    }

    pub fn stage(&self) -> &Stage {
        &self.slot.stage
    }

    pub fn metrics(&self) -> &ProcessorMetrics {
        &self.slot.metrics
    }
}

impl std::fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.slot.stage, f)
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    id: String,
    config: PipelineConfig,
    metrics_service: Option<Arc<MetricsService>>,
    alerts: Option<Arc<dyn AlertService>>,
    error_handler: Option<Box<dyn ErrorHandler>>,
    pubsub: Option<PubSub>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared metrics service; a private one is created otherwise
    pub fn metrics_service(mut self, service: Arc<MetricsService>) -> Self {
        self.metrics_service = Some(service);
        self
    }

    /// Alert sink; defaults to [`LogAlertService`]
    pub fn alert_service(mut self, alerts: Arc<dyn AlertService>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Error classification; defaults to the `stop_on_errors` policy
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    pub fn pubsub(mut self, pubsub: PubSub) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    pub fn build(self) -> Result<Arc<Pipeline>> {
        self.config.validate(&self.id)?;

        let service = self
            .metrics_service
            .unwrap_or_else(|| Arc::new(MetricsService::new()));
        let metrics = PipelineMetrics::register(&service, &self.id)?;
        let log = PipelineLog::new(self.id.clone(), metrics.counter.clone());
        let alert_id = self
            .config
            .alert_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let stop_on_errors = self.config.stop_on_errors;
        let error_handler = self
            .error_handler
            .unwrap_or_else(|| Box::new(StopOnErrors(stop_on_errors)));
        let alerts = self
            .alerts
            .unwrap_or_else(|| Arc::new(LogAlertService::new()));
        let (ready, _) = watch::channel(false);
        let (changes, _) = watch::channel(0u64);

        let id = self.id;
        let config = self.config;
        let pubsub = self.pubsub.unwrap_or_default();

        Ok(Arc::new_cyclic(|me: &Weak<Pipeline>| {
            let weak = me.clone();
            let flush_hook = service.on_flush(move |window| {
                if let Some(pipeline) = weak.upgrade() {
                    pipeline.on_metrics_flush(window);
                }
            });

            Pipeline {
                id,
                me: me.clone(),
                config,
                alert_id,
                sources: RwLock::new(Vec::new()),
                topology: RwLock::new(Arc::new(vec![Vec::new()])),
                sinks: RwLock::new(Vec::new()),
                context: RwLock::new(Context::new()),
                state: Mutex::new(State::default()),
                ready,
                changes,
                chillout: AtomicU64::new(0),
                in_flight: Mutex::new(0),
                tasks: TaskTracker::new(),
                pubsub,
                alerts,
                error_handler,
                metrics_service: service,
                metrics,
                log,
                flush_hook,
            }
        }))
    }
}

/// Event processing pipeline
pub struct Pipeline {
    id: String,
    me: Weak<Pipeline>,
    config: PipelineConfig,
    alert_id: String,

    sources: RwLock<Vec<Arc<dyn Source>>>,
    /// Copy-on-write so routing never holds the lock while stages run
    topology: RwLock<Arc<Topology>>,
    sinks: RwLock<Vec<Arc<SinkRoute>>>,
    context: RwLock<Context>,

    state: Mutex<State>,
    ready: watch::Sender<bool>,
    /// Bumped on every readiness evaluation
    changes: watch::Sender<u64>,
    chillout: AtomicU64,

    in_flight: Mutex<usize>,
    tasks: TaskTracker,

    pubsub: PubSub,
    alerts: Arc<dyn AlertService>,
    error_handler: Box<dyn ErrorHandler>,
    metrics_service: Arc<MetricsService>,
    metrics: PipelineMetrics,
    log: PipelineLog,
    flush_hook: HookId,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .field("error", &self.is_error())
            .finish()
    }
}

impl Pipeline {
    /// Start building a pipeline with default configuration
    pub fn builder(id: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            id: id.into(),
            config: PipelineConfig::default(),
            metrics_service: None,
            alerts: None,
            error_handler: None,
            pubsub: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stable identity of this pipeline's alerts
    pub fn alert_id(&self) -> &str {
        &self.alert_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pubsub(&self) -> &PubSub {
        &self.pubsub
    }

    pub fn log(&self) -> &PipelineLog {
        &self.log
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn metrics_service(&self) -> &Arc<MetricsService> {
        &self.metrics_service
    }

    /// Current UTC time
    pub fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    // Context

    /// Replace the base context merged into every injected event
    pub fn set_context(&self, context: Context) {
        *self.context.write() = context;
    }

    pub fn context(&self) -> Context {
        self.context.read().clone()
    }

    // Construction

    /// Wire sources and append stages in order
    pub fn build<S, I>(&self, sources: S, stages: I) -> Result<()>
    where
        S: IntoIterator<Item = Arc<dyn Source>>,
        I: IntoIterator<Item = Stage>,
    {
        for source in sources {
            self.set_source(source);
        }
        for stage in stages {
            self.append_processor(stage)?;
        }
        Ok(())
    }

    pub fn set_source(&self, source: Arc<dyn Source>) {
        self.sources.write().push(source);
    }

    pub fn sources(&self) -> Vec<Arc<dyn Source>> {
        self.sources.read().clone()
    }

    pub fn locate_source(&self, id: &str) -> Option<Arc<dyn Source>> {
        self.sources.read().iter().find(|s| s.id() == id).cloned()
    }

    /// Add a fallback sink consulted when a depth ends unconsumed
    pub fn add_sink_route<P>(&self, predicate: P, sink: impl Sink + 'static)
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.sinks.write().push(Arc::new(SinkRoute {
            predicate: Box::new(predicate),
            sink: Box::new(sink),
        }));
    }

    fn new_slot(&self, stage: Stage) -> Result<Arc<Slot>> {
        let metrics = ProcessorMetrics::register(
            &self.metrics_service,
            &self.id,
            stage.id(),
            self.config.reset_profiler,
        )?;
        Ok(Arc::new(Slot { stage, metrics }))
    }

    /// Append a stage to the last depth; a generator opens a new depth
    pub fn append_processor(&self, mut stage: Stage) -> Result<()> {
        let mut topology = self.topology.write();
        let mut next: Topology = (**topology).clone();

        if let Some(sink) = next
            .iter()
            .filter_map(|depth| depth.last())
            .find(|slot| slot.stage.is_sink())
        {
            warn!(
                pipeline = %self.id,
                processor = %stage.id(),
                sink = %sink.stage.id(),
                "appending a stage after a sink"
            );
        }

        let depth = next.len() - 1;
        let opens_depth = match &mut stage {
            Stage::Generator(generator) => {
                generator.set_depth(depth);
                true
            }
            _ => false,
        };

        let slot = self.new_slot(stage)?;
        next[depth].push(slot);
        if opens_depth {
            next.push(Vec::new());
        }
        *topology = Arc::new(next);
        Ok(())
    }

    /// Insert before the stage `id`; false when `id` is unknown
    ///
    /// A generator inserted at the last depth opens a new depth, as with
    /// [`append_processor`](Self::append_processor).
    pub fn insert_before(&self, id: &str, stage: Stage) -> Result<bool> {
        self.insert_relative(id, stage, 0)
    }

    /// Insert after the stage `id`; false when `id` is unknown
    pub fn insert_after(&self, id: &str, stage: Stage) -> Result<bool> {
        self.insert_relative(id, stage, 1)
    }

    fn insert_relative(&self, id: &str, mut stage: Stage, offset: usize) -> Result<bool> {
        let mut topology = self.topology.write();
        let Some((depth, index)) = position(&topology, id) else {
            return Ok(false);
        };
        let opens_depth = match &mut stage {
            Stage::Generator(generator) => {
                generator.set_depth(depth);
                depth + 1 == topology.len()
            }
            _ => false,
        };

        let slot = self.new_slot(stage)?;
        let mut next: Topology = (**topology).clone();
        next[depth].insert(index + offset, slot);
        if opens_depth {
            next.push(Vec::new());
        }
        *topology = Arc::new(next);
        Ok(true)
    }

    /// Remove the stage `id` and its metrics
    pub fn remove_processor(&self, id: &str) -> Result<()> {
        let mut topology = self.topology.write();
        let (depth, index) =
            position(&topology, id).ok_or_else(|| PipelineError::ProcessorNotFound(id.to_string()))?;

        let mut next: Topology = (**topology).clone();
        let slot = next[depth].remove(index);
        slot.metrics.unregister(&self.metrics_service);
        *topology = Arc::new(next);
        Ok(())
    }

    /// All stages, depth by depth
    pub fn iter_processors(&self) -> impl Iterator<Item = ProcessorHandle> {
        let topology = self.topology.read().clone();
        topology
            .iter()
            .flatten()
            .map(|slot| ProcessorHandle { slot: slot.clone() })
            .collect::<Vec<_>>()
            .into_iter()
    }

    pub fn locate_processor(&self, id: &str) -> Option<ProcessorHandle> {
        self.iter_processors().find(|p| p.id() == id)
    }

    /// Number of depths
    pub fn depths(&self) -> usize {
        self.topology.read().len()
    }

    // Ancestors

    /// Propagate this pipeline's throttles to `ancestor`
    pub fn link(&self, ancestor: &Arc<Pipeline>) {
        let mut state = self.state.lock();
        if !state
            .ancestors
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(ancestor)))
        {
            state.ancestors.push(Arc::downgrade(ancestor));
        }
    }

    /// Stop propagating to `ancestor` and release the throttles it holds
    /// on this pipeline's behalf
    pub fn unlink(&self, ancestor: &Arc<Pipeline>) -> Result<()> {
        let held: Vec<ThrottleKey> = {
            let mut state = self.state.lock();
            let before = state.ancestors.len();
            state
                .ancestors
                .retain(|w| !std::ptr::eq(w.as_ptr(), Arc::as_ptr(ancestor)));
            if state.ancestors.len() == before {
                return Err(PipelineError::NotLinked {
                    pipeline: self.id.clone(),
                    ancestor: ancestor.id.clone(),
                });
            }
            state.throttles.iter().cloned().collect()
        };

        for key in held {
            ancestor.throttle(key, false);
        }
        Ok(())
    }

    // Readiness

    /// Add or remove a throttle, propagating to linked ancestors
    pub fn throttle(&self, who: impl Into<ThrottleKey>, enable: bool) {
        let key = who.into();
        let ancestors: Vec<Arc<Pipeline>> = {
            let mut state = self.state.lock();
            if enable {
                state.throttles.insert(key.clone());
            } else {
                state.throttles.remove(&key);
            }
            state.ancestors.iter().filter_map(Weak::upgrade).collect()
        };

        for ancestor in ancestors {
            ancestor.throttle(key.clone(), enable);
        }

        self.evaluate_ready();
    }

    pub fn get_throttles(&self) -> Vec<ThrottleKey> {
        self.state.lock().throttles.iter().cloned().collect()
    }

    fn futures_key(&self) -> ThrottleKey {
        ThrottleKey::AsyncFutures(self.id.clone())
    }

    fn evaluate_ready(&self) {
        let changed = {
            let state = self.state.lock();
            let ready = state.error.is_none() && state.throttles.is_empty();
            self.ready
                .send_if_modified(|current| {
                    if *current == ready {
                        return false;
                    }
                    *current = ready;
                    true
                })
                .then_some(ready)
        };
        self.changes.send_modify(|version| *version = version.wrapping_add(1));

        if let Some(ready) = changed {
            self.metrics.duty.set("ready", ready);
            if ready {
                debug!(pipeline = %self.id, "pipeline ready");
                self.pubsub.publish(Topic::Ready, &self.id);
            } else {
                debug!(pipeline = %self.id, "pipeline not ready");
                self.pubsub.publish(Topic::NotReady, &self.id);
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until ready, yielding every `chillout_trigger` calls
    pub async fn ready(&self) -> bool {
        self.chillout().await;
        let mut rx = self.ready.subscribe();
        rx.wait_for(|ready| *ready).await.is_ok()
    }

    /// Wait until ready apart from the throttle `key`
    ///
    /// For sources whose own throttle only signals a full buffer: their
    /// consumer loop must keep draining while that throttle is set.
    pub async fn ready_except(&self, key: &ThrottleKey) -> bool {
        self.chillout().await;
        let mut rx = self.changes.subscribe();
        loop {
            {
                let state = self.state.lock();
                if state.error.is_none() && state.throttles.iter().all(|k| k == key) {
                    return true;
                }
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    async fn chillout(&self) {
        let calls = self.chillout.fetch_add(1, Ordering::Relaxed) + 1;
        if calls >= self.config.chillout_trigger {
            self.chillout.store(0, Ordering::Relaxed);
            tokio::task::yield_now().await;
        }
    }

    // Errors

    pub fn is_error(&self) -> bool {
        self.state.lock().error.is_some()
    }

    pub fn error(&self) -> Option<ErrorRecord> {
        self.state.lock().error.clone()
    }

    /// Report (`Some`) or clear (`None`) a processing error
    pub fn set_error(
        &self,
        context: Option<Context>,
        event: Option<Event>,
        error: Option<ProcessingError>,
    ) {
        let Some(error) = error else {
            self.clear_error();
            return;
        };

        self.alerts.trigger(self.build_alert(&error, event.as_ref()));

        let context = context.unwrap_or_default();
        if self
            .error_handler
            .handle_error(&error, &context, event.as_ref())
        {
            self.metrics.record_warning();
            warn!(pipeline = %self.id, error = %error, "event dropped after a processing error");
            self.pubsub.publish(Topic::Warning, &self.id);
            return;
        }

        self.metrics.record_error();
        {
            let mut state = self.state.lock();
            if state.error.is_some() {
                warn!(pipeline = %self.id, "error on a pipeline is already set");
            }
            state.error = Some(ErrorRecord {
                context,
                event,
                error: error.clone(),
                timestamp: Utc::now(),
            });
        }

        error!(
            pipeline = %self.id,
            error = %error,
            kind = error.kind(),
            "pipeline stopped due to a processing error"
        );
        self.pubsub.publish(Topic::Error, &self.id);
        self.evaluate_ready();
    }

    fn clear_error(&self) {
        let cleared = self.state.lock().error.take().is_some();
        if cleared {
            info!(pipeline = %self.id, "error cleared");
            self.alerts.resolve(&self.alert_id);
            if let Some(me) = self.me.upgrade() {
                for source in self.sources() {
                    source.restart(me.clone());
                }
            }
            self.pubsub.publish(Topic::ClearError, &self.id);
        }
        self.evaluate_ready();
    }

    fn build_alert(&self, error: &ProcessingError, event: Option<&Event>) -> Alert {
        let mut traceback = error.to_string();
        let mut cause = std::error::Error::source(error);
        while let Some(inner) = cause {
            traceback.push_str("\ncaused by: ");
            traceback.push_str(&inner.to_string());
            cause = inner.source();
        }

        Alert {
            source: "sluice".to_string(),
            alert_cls: self.id.clone(),
            alert_id: self.alert_id.clone(),
            title: format!("{}:{} ERROR", self.id, self.alert_id),
            data: AlertData {
                exception: format!("{}: {}", error.kind(), error),
                event: event.map(ToString::to_string).unwrap_or_default(),
                traceback,
            },
        }
    }

    // Processing

    /// Entry point for sources: wait until ready, then inject at depth 0
    pub async fn process(&self, event: Event, context: Option<Context>) -> std::result::Result<(), ProcessingError> {
        self.ready().await;
        self.process_now(event, context)
    }

    /// Count and inject at depth 0 without waiting for readiness
    ///
    /// For sources that gate on [`ready_except`](Self::ready_except) themselves.
    pub fn process_now(&self, event: Event, context: Option<Context>) -> std::result::Result<(), ProcessingError> {
        self.metrics.record_in();
        self.inject(context, event, 0)
    }

    /// Run `event` through `depth` synchronously; never waits for readiness
    pub fn inject(
        &self,
        context: Option<Context>,
        event: Event,
        depth: usize,
    ) -> std::result::Result<(), ProcessingError> {
        self.inject_traced(context, event, depth, None)
    }

    /// `inject` that also leaves its breadcrumb on a generator task's trail
    pub(crate) fn inject_traced(
        &self,
        context: Option<Context>,
        event: Event,
        depth: usize,
        trail: Option<&Trail>,
    ) -> std::result::Result<(), ProcessingError> {
        let context = merge_context(&self.context.read(), context);
        let crumb = Arc::new(Breadcrumb {
            context: context.clone(),
            event: event.clone(),
            timestamp: Utc::now(),
        });
        if let Some(trail) = trail {
            *trail.lock() = Some(crumb.clone());
        }
        self.state.lock().breadcrumb = Some(crumb.clone());

        self.do_process(event, depth, context, &crumb)
    }

    fn do_process(
        &self,
        mut event: Event,
        depth: usize,
        mut context: Context,
        crumb: &Breadcrumb,
    ) -> std::result::Result<(), ProcessingError> {
        let topology = self.topology.read().clone();
        let depths = topology.len();
        let Some(stages) = topology.get(depth) else {
            return Err(ProcessingError::InvalidDepth { depth, depths });
        };
        let last_depth = depth + 1 == depths;

        for slot in stages {
            let started = Instant::now();
            slot.metrics.counter.add("event.in", 1.0);

            let outcome = match &slot.stage {
                Stage::Processor(processor) => processor.process(&mut context, event),
                Stage::Sink(sink) => sink.process(&mut context, event),
                Stage::Generator(generator) => {
                    let trail: Trail = Arc::new(Mutex::new(Some(Arc::new(Breadcrumb {
                        context: context.clone(),
                        event: event.clone(),
                        timestamp: Utc::now(),
                    }))));
                    let injector = Injector::new(self.me.clone(), depth + 1, trail.clone());
                    self.track(generator.generate(context.clone(), event, injector), Some(trail));
                    Ok(None)
                }
            };
            slot.metrics.record_run(started.elapsed());

            match outcome {
                Ok(Some(next)) => event = next,
                Ok(None) => {
                    match &slot.stage {
                        // Handed off to depth + 1
                        Stage::Generator(_) => {}
                        Stage::Sink(_) if last_depth => self.metrics.record_out(),
                        _ => {
                            slot.metrics.counter.add("event.drop", 1.0);
                            self.metrics.record_drop();
                        }
                    }
                    return Ok(());
                }
                Err(err) => {
                    slot.metrics.counter.add("event.drop", 1.0);
                    if depth > 0 {
                        return Err(err);
                    }
                    if last_depth {
                        self.metrics.record_drop();
                    }
                    self.set_error(Some(context), Some(crumb.event.clone()), Some(err));
                    return Ok(());
                }
            }
        }

        self.route_to_sinks(event, depth, context, crumb)
    }

    /// Single attempt by the first matching fallback sink
    fn route_to_sinks(
        &self,
        event: Event,
        depth: usize,
        mut context: Context,
        crumb: &Breadcrumb,
    ) -> std::result::Result<(), ProcessingError> {
        let routes: Vec<Arc<SinkRoute>> = self.sinks.read().clone();

        let leftover = match routes.iter().find(|route| (route.predicate)(&event)) {
            None => event,
            Some(route) => match route.sink.process(&mut context, event) {
                Ok(None) => {
                    self.metrics.record_out();
                    return Ok(());
                }
                Ok(Some(unconsumed)) => unconsumed,
                Err(err) => {
                    if depth > 0 {
                        return Err(err);
                    }
                    self.metrics.record_drop();
                    self.set_error(Some(context), Some(crumb.event.clone()), Some(err));
                    return Ok(());
                }
            },
        };

        let err = ProcessingError::Incomplete {
            event: leftover.to_string(),
        };
        self.set_error(Some(context), Some(leftover), Some(err));
        Ok(())
    }

    // Tracked futures

    /// Spawn and track a future; throttles at `async_concurency_limit`
    pub fn ensure_future<F>(&self, future: F)
    where
        F: Future<Output = std::result::Result<(), ProcessingError>> + Send + 'static,
    {
        self.track(future, None);
    }

    /// Failures are reported against the last event on `trail`, or the
    /// pipeline-wide breadcrumb without one
    fn track<F>(&self, future: F, trail: Option<Trail>)
    where
        F: Future<Output = std::result::Result<(), ProcessingError>> + Send + 'static,
    {
        {
            let mut in_flight = self.in_flight.lock();
            *in_flight += 1;
            if *in_flight == self.config.async_concurrency_limit {
                self.throttle(self.futures_key(), true);
            }
        }

        let me = self.me.clone();
        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(ProcessingError::TaskFailed("future panicked".to_string())),
            };
            if let Some(pipeline) = me.upgrade() {
                pipeline.future_done(result, trail);
            }
        });
    }

    /// Tracked futures not yet completed
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    fn future_done(&self, result: std::result::Result<(), ProcessingError>, trail: Option<Trail>) {
        {
            let mut in_flight = self.in_flight.lock();
            if *in_flight == self.config.async_concurrency_limit {
                self.throttle(self.futures_key(), false);
            }
            *in_flight = in_flight.saturating_sub(1);
        }

        let Err(error) = result else {
            return;
        };

        let crumb = match trail.and_then(|trail| trail.lock().clone()) {
            Some(crumb) => Some(crumb),
            None => self.state.lock().breadcrumb.clone(),
        };
        let last = self.topology.read().iter().flatten().last().cloned();

        let substitute = match (last.as_deref(), crumb.as_deref()) {
            (
                Some(Slot {
                    stage: Stage::Sink(sink),
                    ..
                }),
                Some(crumb),
            ) => sink
                .handle_error(&crumb.context, Some(&crumb.event), &error, crumb.timestamp)
                .map(|event| (crumb.context.clone(), event)),
            _ => None,
        };

        match substitute {
            Some((context, event)) => self.set_error(Some(context), Some(event), Some(error)),
            None => self.set_error(None, None, Some(error)),
        }
    }

    // Lifecycle

    /// Start every source and evaluate readiness
    pub fn start(&self) {
        info!(
            pipeline = %self.id,
            sources = self.sources.read().len(),
            depths = self.depths(),
            "pipeline starting"
        );
        self.pubsub.publish(Topic::Start, &self.id);

        if let Some(me) = self.me.upgrade() {
            for source in self.sources() {
                source.start(me.clone());
            }
        }

        self.evaluate_ready();
    }

    /// Drain tracked futures, then stop every source
    pub async fn stop(&self) {
        info!(pipeline = %self.id, in_flight = self.in_flight(), "pipeline stopping");
        self.pubsub.publish(Topic::Stop, &self.id);

        self.tasks.close();
        match self.config.drain_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, self.tasks.wait()).await.is_err() {
                    warn!(
                        pipeline = %self.id,
                        in_flight = self.in_flight(),
                        timeout_ms = limit.as_millis() as u64,
                        "drain timed out, leaving futures running"
                    );
                }
            }
            None => self.tasks.wait().await,
        }
        self.tasks.reopen();

        for source in self.sources() {
            source.stop().await;
        }

        info!(pipeline = %self.id, "pipeline stopped");
    }

    // Introspection

    pub fn rest_get(&self) -> PipelineSnapshot {
        let (throttles, error) = {
            let state = self.state.lock();
            (
                state.throttles.iter().map(ToString::to_string).collect(),
                state
                    .error
                    .as_ref()
                    .map(|record| (record.error.to_string(), record.timestamp)),
            )
        };

        let topology = self.topology.read().clone();
        let processors = topology
            .iter()
            .map(|depth| {
                depth
                    .iter()
                    .map(|slot| ProcessorInfo {
                        id: slot.stage.id().to_string(),
                        kind: slot.stage.kind(),
                    })
                    .collect()
            })
            .collect();

        PipelineSnapshot {
            id: self.id.clone(),
            ready: self.is_ready(),
            throttles,
            sources: self.sources.read().iter().map(|s| s.id().to_string()).collect(),
            processors,
            metrics: self.metrics_service.snapshot_tagged("pipeline", &self.id),
            log: self.log.records(),
            error_timestamp: error.as_ref().map(|(_, ts)| *ts),
            error: error.map(|(text, _)| text),
        }
    }

    fn on_metrics_flush(&self, window: &FlushWindow) {
        self.metrics.update_ratios();
        for slot in self.topology.read().iter().flatten() {
            slot.metrics.update_eps(window);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.metrics_service.remove_hook(self.flush_hook);
        self.metrics_service.remove_tagged("pipeline", &self.id);
    }
}

fn position(topology: &Topology, id: &str) -> Option<(usize, usize)> {
    topology.iter().enumerate().find_map(|(depth, stages)| {
        stages
            .iter()
            .position(|slot| slot.stage.id() == id)
            .map(|index| (depth, index))
    })
}
