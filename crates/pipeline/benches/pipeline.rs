//! Pipeline benchmark suite
//!
//! Benchmarks for synchronous injection, the ready-gated entry point and
//! generator fan-out.
//!
//! Run with: `cargo bench -p sluice-pipeline`

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use sluice_pipeline::{
    BoxFuture, Context, Event, Generator, Injector, Pipeline, ProcessingError, Processor, Sink,
    Stage, StageResult,
};
use tokio::runtime::Runtime;

struct Tag(String);

impl Processor for Tag {
    fn id(&self) -> &str {
        &self.0
    }

    fn process(&self, _context: &mut Context, mut event: Event) -> StageResult {
        if let Value::Object(map) = &mut event {
            map.insert(self.0.clone(), Value::Bool(true));
        }
        Ok(Some(event))
    }
}

struct Null;

impl Sink for Null {
    fn id(&self) -> &str {
        "null"
    }

    fn process(&self, _context: &mut Context, event: Event) -> StageResult {
        black_box(event);
        Ok(None)
    }
}

struct Explode;

impl Generator for Explode {
    fn id(&self) -> &str {
        "explode"
    }

    fn generate(
        &self,
        context: Context,
        event: Event,
        injector: Injector,
    ) -> BoxFuture<'static, Result<(), ProcessingError>> {
        Box::pin(async move {
            if let Value::Array(items) = event {
                for item in items {
                    injector.inject(Some(context.clone()), item)?;
                }
            }
            Ok::<(), ProcessingError>(())
        })
    }
}

fn chain(stages: usize) -> Arc<Pipeline> {
    let pipeline = Pipeline::builder("bench").build().unwrap();
    for i in 0..stages {
        pipeline
            .append_processor(Stage::processor(Tag(format!("stage-{i}"))))
            .unwrap();
    }
    pipeline.append_processor(Stage::sink(Null)).unwrap();
    pipeline.start();
    pipeline
}

fn sample_event() -> Event {
    json!({"host": "web-1", "level": "info", "message": "request served", "status": 200})
}

/// Benchmark synchronous injection through processor chains of growing length
fn bench_inject_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("inject_chain");

    for stages in [0, 1, 4, 16] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(stages), &stages, |b, &n| {
            let pipeline = chain(n);
            b.iter(|| black_box(pipeline.inject(None, sample_event(), 0)));
        });
    }

    group.finish();
}

/// Benchmark the ready-gated entry point used by sources
fn bench_process(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pipeline = chain(4);

    c.bench_function("process_ready", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(pipeline.process(sample_event(), None).await) });
    });
}

/// Benchmark generator fan-out into a deeper depth
fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fan_out");

    for width in [1, 10, 100] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &w| {
            let pipeline = Pipeline::builder("fan-out").build().unwrap();
            pipeline
                .build([], [Stage::generator(Explode), Stage::sink(Null)])
                .unwrap();
            pipeline.start();
            let batch = Value::Array((0..w).map(|i| json!({"i": i})).collect());

            b.to_async(&rt).iter(|| {
                let pipeline = pipeline.clone();
                let batch = batch.clone();
                async move {
                    pipeline.process(batch, None).await.unwrap();
                    while pipeline.in_flight() > 0 {
                        tokio::task::yield_now().await;
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_inject_chain, bench_process, bench_fan_out);
criterion_main!(benches);
