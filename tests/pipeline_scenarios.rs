//! End-to-end scenarios: stages driven by a real scheduler.

use stagepipe::media::SyntheticMedia;
use stagepipe::pipeline::{
    Buffer, CollectorSink, DiscardSink, InterStageQueue, Lifecycle, Pipeline, SinkStage,
    SourceStage, SourceState, Stage, StageError, TransformStage,
};
use stagepipe::scheduler::{IdleBackoff, Progress, SchedulerConfig, TaskScheduler};
use stagepipe::ErrorReporter;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn numbered_source(stream: &str, packets: usize) -> SourceStage {
    let media = SyntheticMedia::new().with_numbered_stream(stream, packets);
    SourceStage::new("demux", stream, Arc::new(media))
}

#[derive(Default)]
struct CollectingReporter {
    errors: Mutex<Vec<(String, StageError)>>,
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, task: &str, error: &StageError) {
        self.errors
            .lock()
            .unwrap()
            .push((task.to_string(), error.clone()));
    }
}

#[test]
fn test_source_reads_ten_packets_then_stays_idle() {
    let queue = InterStageQueue::unbounded();
    let mut source = numbered_source("clip", 10);
    source.init(queue.writer()).unwrap();

    // First step opens and probes the input
    assert_eq!(source.run().unwrap(), Progress::Busy);
    assert_eq!(source.state(), SourceState::Reading);

    let mut busy = 0;
    while source.run().unwrap() == Progress::Busy {
        busy += 1;
    }
    assert_eq!(busy, 10);
    assert_eq!(source.state(), SourceState::EndOfStream);

    for _ in 0..100 {
        assert_eq!(source.run().unwrap(), Progress::Idle);
    }
    assert_eq!(queue.len(), 10);
}

#[test]
fn test_source_to_sink_on_four_workers_transfers_everything() {
    let collector = CollectorSink::new();
    let collected = collector.handle();
    let pipeline = Pipeline::linear(vec![
        Box::new(numbered_source("clip", 10)),
        Box::new(SinkStage::new(
            "mux",
            InterStageQueue::unbounded(),
            collector,
        )),
    ])
    .unwrap();

    let mut scheduler = TaskScheduler::new(SchedulerConfig::default());
    pipeline.register(&scheduler);
    scheduler.start(4).unwrap();
    assert!(pipeline.wait_drained(DRAIN_TIMEOUT));
    scheduler.stop();

    let expected: Vec<Vec<u8>> = (0..10)
        .map(|n| format!("packet-{}", n).into_bytes())
        .collect();
    assert_eq!(collected.payloads(), expected);
    assert_eq!(collected.sequences(), (0..10).collect::<Vec<u64>>());
}

#[test]
fn test_failed_open_never_leaves_init() {
    let media = SyntheticMedia::new();
    let mut source = SourceStage::new("demux", "/no/such/input.mp4", Arc::new(media));
    source.init(None).unwrap();

    for _ in 0..100 {
        assert_eq!(source.run().unwrap(), Progress::Idle);
        assert_eq!(source.state(), SourceState::Init);
    }
    assert_eq!(source.lifecycle(), Lifecycle::Ready);
}

#[test]
fn test_failed_open_stalls_pipeline_without_errors() {
    let reporter = Arc::new(CollectingReporter::default());
    let media = SyntheticMedia::new();
    let pipeline = Pipeline::linear(vec![
        Box::new(SourceStage::new("demux", "missing", Arc::new(media))),
        Box::new(SinkStage::new("mux", InterStageQueue::unbounded(), DiscardSink)),
    ])
    .unwrap();

    let mut scheduler =
        TaskScheduler::with_error_reporter(SchedulerConfig::default(), reporter.clone());
    pipeline.register(&scheduler);
    scheduler.start(2).unwrap();
    assert!(!pipeline.wait_drained(Duration::from_millis(100)));
    scheduler.stop();

    assert!(reporter.errors.lock().unwrap().is_empty());
    assert_eq!(scheduler.registered_tasks(), 2);
    assert_eq!(scheduler.stats().busy, 0);
}

#[test]
fn test_backoff_starts_after_exactly_the_threshold() {
    let mut backoff = IdleBackoff::new(3);
    let sleeps: Vec<bool> = (0..6).map(|_| backoff.record(Progress::Idle)).collect();
    assert_eq!(sleeps, vec![false, false, false, true, true, true]);

    // One worker, one starved task: every Idle past the third sleeps
    let mut scheduler = TaskScheduler::new(SchedulerConfig {
        workers: 1,
        idle_threshold: 3,
        idle_backoff_ms: 1,
    });
    scheduler.submit("starved", || Ok(Progress::Idle));
    scheduler.start_default().unwrap();
    thread::sleep(Duration::from_millis(30));
    scheduler.stop();

    let stats = scheduler.stats();
    assert!(stats.idle > 3);
    assert_eq!(stats.backoff_sleeps, stats.idle - 3);
}

#[test]
fn test_backoff_reduces_poll_frequency() {
    let run_for = |idle_threshold: usize| {
        let mut scheduler = TaskScheduler::new(SchedulerConfig {
            workers: 1,
            idle_threshold,
            idle_backoff_ms: 1,
        });
        scheduler.submit("starved", || Ok(Progress::Idle));
        scheduler.start_default().unwrap();
        thread::sleep(Duration::from_millis(50));
        scheduler.stop();
        scheduler.stats().dispatched
    };

    let spinning = run_for(usize::MAX);
    let backing_off = run_for(3);
    assert!(
        backing_off * 5 < spinning,
        "backing_off={} spinning={}",
        backing_off,
        spinning
    );
}

#[test]
fn test_three_stage_chain_with_bounded_queues_keeps_order() {
    let collector = CollectorSink::new();
    let collected = collector.handle();
    let invert = |buffer: Buffer| -> Result<Option<Buffer>, StageError> {
        let sequence = buffer.sequence();
        let data = buffer.into_data().iter().map(|b| !b).collect();
        Ok(Some(Buffer::new(data, sequence)))
    };
    let pipeline = Pipeline::linear(vec![
        Box::new(numbered_source("clip", 200)),
        Box::new(TransformStage::new("decode", InterStageQueue::bounded(2), invert)),
        Box::new(SinkStage::new("mux", InterStageQueue::bounded(2), collector)),
    ])
    .unwrap();

    let mut scheduler = TaskScheduler::new(SchedulerConfig::default());
    pipeline.register(&scheduler);
    scheduler.start(4).unwrap();
    assert!(pipeline.wait_drained(DRAIN_TIMEOUT));
    scheduler.stop();

    assert_eq!(collected.sequences(), (0..200).collect::<Vec<u64>>());
    let first: Vec<u8> = b"packet-0".iter().map(|b| !b).collect();
    assert_eq!(collected.payloads()[0], first);
    for (_, lifecycle) in pipeline.states() {
        assert_eq!(lifecycle, Lifecycle::Draining);
    }
}

#[test]
fn test_fatal_stage_does_not_stop_other_pipelines() {
    let reporter = Arc::new(CollectingReporter::default());
    let corrupt = SyntheticMedia::new()
        .with_numbered_stream("broken", 10)
        .with_corrupt_handle_after("broken", 2);
    let broken = Pipeline::linear(vec![
        Box::new(SourceStage::new("demux-broken", "broken", Arc::new(corrupt))),
        Box::new(SinkStage::new("mux-broken", InterStageQueue::unbounded(), DiscardSink)),
    ])
    .unwrap();

    let collector = CollectorSink::new();
    let collected = collector.handle();
    let healthy = Pipeline::linear(vec![
        Box::new(numbered_source("clip", 50)),
        Box::new(SinkStage::new("mux", InterStageQueue::unbounded(), collector)),
    ])
    .unwrap();

    let mut scheduler =
        TaskScheduler::with_error_reporter(SchedulerConfig::default(), reporter.clone());
    broken.register(&scheduler);
    healthy.register(&scheduler);
    scheduler.start(4).unwrap();
    assert!(healthy.wait_drained(DRAIN_TIMEOUT));
    scheduler.stop();

    assert_eq!(collected.len(), 50);
    assert_eq!(scheduler.stats().aborted, 1);
    assert_eq!(scheduler.registered_tasks(), 3);

    let errors = reporter.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "demux-broken");
    assert!(errors[0].1.is_fatal());
}

#[test]
fn test_many_pipelines_share_a_small_pool() {
    let mut pipelines = Vec::new();
    let mut handles = Vec::new();
    for n in 0..8 {
        let collector = CollectorSink::new();
        handles.push(collector.handle());
        let stream = format!("clip-{}", n);
        pipelines.push(
            Pipeline::linear(vec![
                Box::new(numbered_source(&stream, 25)),
                Box::new(SinkStage::new("mux", InterStageQueue::unbounded(), collector)),
            ])
            .unwrap(),
        );
    }

    let mut scheduler = TaskScheduler::new(SchedulerConfig::default());
    for pipeline in &pipelines {
        pipeline.register(&scheduler);
    }
    scheduler.start(2).unwrap();
    for pipeline in &pipelines {
        assert!(pipeline.wait_drained(DRAIN_TIMEOUT));
    }
    scheduler.stop();

    for handle in &handles {
        assert_eq!(handle.len(), 25);
        assert!(handle.is_finished());
    }
}
