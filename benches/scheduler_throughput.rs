use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use stagepipe::media::SyntheticMedia;
use stagepipe::pipeline::{DiscardSink, InterStageQueue, Pipeline, SinkStage, SourceStage};
use stagepipe::scheduler::{SchedulerConfig, TaskScheduler};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

const PACKETS: usize = 2_000;

/// Builds, runs and drains one Source -> Sink pipeline.
fn transfer(media: &SyntheticMedia, workers: usize, capacity: usize) -> bool {
    let pipeline = Pipeline::linear(vec![
        Box::new(SourceStage::new(
            "demux",
            "bench",
            Arc::new(media.clone()),
        )),
        Box::new(SinkStage::new(
            "mux",
            InterStageQueue::with_capacity(capacity),
            DiscardSink,
        )),
    ])
    .expect("Failed to build pipeline");

    let mut scheduler = TaskScheduler::new(SchedulerConfig {
        workers,
        ..SchedulerConfig::default()
    });
    pipeline.register(&scheduler);
    scheduler.start_default().expect("Failed to start scheduler");
    let drained = pipeline.wait_drained(Duration::from_secs(30));
    scheduler.stop();
    drained
}

/// Packets per second through a two-stage pipeline across worker counts
fn criterion_benchmark(c: &mut Criterion) {
    let media = SyntheticMedia::new().with_numbered_stream("bench", PACKETS);

    let mut group = c.benchmark_group("source_to_sink");
    group.sample_size(10); // Each iteration spins up a worker pool
    group.throughput(Throughput::Elements(PACKETS as u64));

    for workers in [1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("unbounded", workers),
            &workers,
            |b, &workers| b.iter(|| assert!(transfer(black_box(&media), workers, 0))),
        );
        group.bench_with_input(
            BenchmarkId::new("bounded_16", workers),
            &workers,
            |b, &workers| b.iter(|| assert!(transfer(black_box(&media), workers, 16))),
        );
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
