//! Copy application entry point.
//!
//! Builds a Source -> Sink pipeline for one input, drives it on a
//! scheduler until it drains or the timeout passes, then tears it down.

use crate::config::Config;
use crate::defaults;
use crate::error::{Error, Result};
use crate::media::{FileMedia, MediaError, MediaLibrary, SyntheticMedia};
use crate::pipeline::{
    DiscardSink, InterStageQueue, Lifecycle, Pipeline, SinkStage, SourceStage, Stage,
    StageMetrics, WriterSink,
};
use crate::scheduler::{StatsSnapshot, TaskScheduler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where packets come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    File(PathBuf),
    /// In-memory stream of N numbered packets.
    Synthetic(usize),
}

impl InputSpec {
    /// Parses a command-line input: a path or `synthetic:N`.
    pub fn parse(input: &str) -> Result<Self> {
        match input.strip_prefix(defaults::SYNTHETIC_PREFIX) {
            Some(count) => count
                .trim()
                .parse()
                .map(InputSpec::Synthetic)
                .map_err(|_| Error::ConfigInvalidValue {
                    key: "input".to_string(),
                    message: format!("expected {}N, got '{}'", defaults::SYNTHETIC_PREFIX, input),
                }),
            None => Ok(InputSpec::File(PathBuf::from(input))),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Packets and bytes the source produced.
    pub read: StageMetrics,
    /// Packets and bytes the sink consumed.
    pub written: StageMetrics,
    /// False when the pipeline was still running at the timeout.
    pub drained: bool,
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
    /// Lifecycle of each stage when the run ended, before teardown.
    pub stages: Vec<(String, Lifecycle)>,
}

fn input_media(spec: &InputSpec, input: &str, config: &Config) -> Arc<dyn MediaLibrary> {
    match spec {
        InputSpec::Synthetic(count) => {
            Arc::new(SyntheticMedia::new().with_numbered_stream(input, *count))
        }
        InputSpec::File(_) => Arc::new(FileMedia::new(config.source.packet_size)),
    }
}

fn sink_stage(output: Option<&Path>, queue: InterStageQueue, config: &Config) -> Result<SinkStage> {
    let stage = match output {
        Some(path) => {
            let target = path
                .to_str()
                .ok_or_else(|| Error::Other(format!("Output path {:?} is not UTF-8", path)))?;
            let writer = WriterSink::open(&FileMedia::new(config.source.packet_size), target)?;
            SinkStage::new("mux", queue, writer)
        }
        None => SinkStage::new("mux", queue, DiscardSink),
    };
    Ok(stage.with_dequeue_timeout(config.queue.dequeue_timeout()))
}

/// Copies `input` to `output` (or discards it) through a scheduled pipeline.
pub fn run_copy(
    config: &Config,
    input: &str,
    output: Option<&Path>,
    timeout: Duration,
) -> Result<RunSummary> {
    config.validate()?;

    let spec = InputSpec::parse(input)?;
    if let InputSpec::File(path) = &spec
        && !path.is_file()
    {
        return Err(MediaError::NotFound {
            source_name: input.to_string(),
        }
        .into());
    }

    let queue = InterStageQueue::with_capacity(config.queue.capacity);
    let source = SourceStage::new("demux", input, input_media(&spec, input, config));
    let sink = sink_stage(output, queue, config)?;
    let stages: Vec<Box<dyn Stage>> = vec![Box::new(source), Box::new(sink)];
    let mut pipeline = Pipeline::linear(stages)?;
    let ids: Vec<_> = pipeline.stage_ids().collect();

    let mut scheduler = TaskScheduler::new(config.scheduler.clone());
    pipeline.register(&scheduler);

    let start = Instant::now();
    scheduler.start_default()?;
    let drained = pipeline.wait_drained(timeout);
    scheduler.stop();
    let elapsed = start.elapsed();

    if !drained {
        log::warn!("Pipeline did not drain within {:?}", timeout);
    }

    let summary = RunSummary {
        read: pipeline.metrics(ids[0]).unwrap_or_default(),
        written: pipeline.metrics(ids[1]).unwrap_or_default(),
        drained,
        elapsed,
        stats: scheduler.stats(),
        stages: pipeline.states(),
    };
    pipeline.teardown();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.scheduler.workers = 2;
        config
    }

    #[test]
    fn test_parse_input_spec() {
        assert_eq!(
            InputSpec::parse("synthetic:10").unwrap(),
            InputSpec::Synthetic(10)
        );
        assert_eq!(
            InputSpec::parse("clip.ts").unwrap(),
            InputSpec::File(PathBuf::from("clip.ts"))
        );
        assert!(InputSpec::parse("synthetic:ten").is_err());
    }

    #[test]
    fn test_synthetic_run_drains() {
        let summary = run_copy(&fast_config(), "synthetic:10", None, Duration::from_secs(5)).unwrap();

        assert!(summary.drained);
        assert_eq!(summary.read.processed, 10);
        assert_eq!(summary.written.processed, 10);
        assert_eq!(summary.stages.len(), 2);
        assert!(summary.stats.busy >= 20);
    }

    #[test]
    fn test_file_copy_is_byte_exact() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.ts");
        let output = dir.path().join("out.ts");
        let data: Vec<u8> = (0..10_000u32).map(|n| (n % 251) as u8).collect();
        std::fs::write(&input, &data).unwrap();

        let mut config = fast_config();
        config.source.packet_size = 188;
        let summary = run_copy(
            &config,
            input.to_str().unwrap(),
            Some(&output),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(summary.drained);
        assert_eq!(summary.written.bytes, 10_000);
        assert_eq!(summary.read.processed, 10_000u64.div_ceil(188));
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[test]
    fn test_missing_input_is_reported_up_front() {
        let result = run_copy(
            &fast_config(),
            "/tmp/nonexistent_stagepipe_input_12345.ts",
            None,
            Duration::from_secs(5),
        );
        assert!(matches!(
            result,
            Err(Error::Media(MediaError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = fast_config();
        config.scheduler.workers = 0;
        assert!(matches!(
            run_copy(&config, "synthetic:1", None, Duration::from_secs(1)),
            Err(Error::ConfigInvalidValue { .. })
        ));
    }
}
