//! Internal source benchmark suite
//!
//! Measures queue-to-sink delivery through a running pipeline: `put` on
//! the caller side, the source loop and a counting sink.
//!
//! Run with: `cargo bench -p sluice-sources --bench internal`

use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use sluice_pipeline::{Pipeline, Source, Stage};
use sluice_sinks::NullSink;
use sluice_sources::InternalSource;

/// Queue `events` with back-off on a full queue, then wait for delivery
async fn deliver(source: &InternalSource, sink: &NullSink, events: u64) {
    let target = sink.snapshot().events_received + events;
    for i in 0..events {
        while source.put(json!({"seq": i}), None).is_err() {
            tokio::task::yield_now().await;
        }
    }
    while sink.snapshot().events_received < target {
        tokio::task::yield_now().await;
    }
}

fn bench_put_to_sink(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("internal_put_to_sink");
    group.measurement_time(Duration::from_secs(5));

    for capacity in [1usize, 10, 1000] {
        let source = Arc::new(InternalSource::with_capacity("queue", capacity));
        let sink = NullSink::new("null");
        let pipeline = Pipeline::builder(format!("bench-{capacity}")).build().unwrap();
        pipeline
            .build([source.clone() as Arc<dyn Source>], [Stage::sink(sink.clone())])
            .unwrap();
        runtime.block_on(async { pipeline.start() });

        let events = 1000u64;
        group.throughput(Throughput::Elements(events));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &events, |b, &events| {
            b.to_async(&runtime).iter(|| deliver(&source, &sink, events));
        });

        runtime.block_on(pipeline.stop());
    }

    group.finish();
}

criterion_group!(benches, bench_put_to_sink);
criterion_main!(benches);
