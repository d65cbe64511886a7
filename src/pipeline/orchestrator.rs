//! Pipeline wiring: an explicit stage table plus a downstream link table.
//!
//! Stages are referenced by [`StageId`], never by address. At build time
//! every link is turned into a writer on the downstream stage's inbound
//! queue, the queues are sealed, and each stage is initialized with its
//! writer. Once registered with a [`TaskScheduler`], each stage becomes one
//! task.

use crate::defaults;
use crate::error::{Error, Result};
use crate::pipeline::error::StageError;
use crate::pipeline::stage::{Lifecycle, Stage};
use crate::pipeline::types::StageMetrics;
use crate::scheduler::{Progress, TaskId, TaskScheduler};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

/// Index of a stage within one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(usize);

impl StageId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

type SharedStage = Arc<Mutex<Box<dyn Stage>>>;

fn lock_stage(stage: &SharedStage) -> MutexGuard<'_, Box<dyn Stage>> {
    // A panicking step poisons the lock; the stage is still inspectable
    stage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collects stages and links, then validates and initializes them.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
    links: Vec<Option<StageId>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, stage: impl Stage) -> StageId {
        self.add_boxed(Box::new(stage))
    }

    pub fn add_boxed(&mut self, stage: Box<dyn Stage>) -> StageId {
        self.stages.push(stage);
        self.links.push(None);
        StageId(self.stages.len() - 1)
    }

    /// Declares `to` as the downstream of `from`.
    ///
    /// A stage has at most one downstream. Several stages may feed the same
    /// downstream (fan-in).
    pub fn link(&mut self, from: StageId, to: StageId) -> Result<&mut Self> {
        let from_stage = self.stage(from)?;
        let to_stage = self.stage(to)?;

        if from == to {
            return Err(Error::SelfLink {
                stage: from_stage.name().to_string(),
            });
        }
        if !from_stage.produces_output() {
            return Err(Error::TerminalStageLink {
                stage: from_stage.name().to_string(),
            });
        }
        if to_stage.base().inbound().is_none() {
            return Err(Error::NoInboundQueue {
                stage: to_stage.name().to_string(),
            });
        }
        if self.links[from.0].is_some() {
            return Err(Error::DuplicateDownstream {
                stage: from_stage.name().to_string(),
            });
        }

        self.links[from.0] = Some(to);
        Ok(self)
    }

    fn stage(&self, id: StageId) -> Result<&dyn Stage> {
        self.stages
            .get(id.0)
            .map(|stage| stage.as_ref())
            .ok_or(Error::UnknownStage { id: id.0 })
    }

    /// Finds a stage that sits on a cycle, if any.
    ///
    /// Every stage has at most one downstream, so each walk is a simple path.
    fn find_cycle(&self) -> Option<StageId> {
        let count = self.links.len();
        for start in 0..count {
            let mut current = self.links[start];
            for _ in 0..count {
                match current {
                    Some(StageId(index)) if index == start => return Some(StageId(start)),
                    Some(StageId(index)) => current = self.links[index],
                    None => break,
                }
            }
        }
        None
    }

    /// Validates the wiring and initializes every stage.
    pub fn build(mut self) -> Result<Pipeline> {
        if self.stages.is_empty() {
            return Err(Error::EmptyPipeline);
        }
        if let Some(id) = self.find_cycle() {
            return Err(Error::CyclicWiring {
                stage: self.stages[id.0].name().to_string(),
            });
        }

        // Writers first: sealing stops the queues from handing out more
        let writers: Vec<_> = self
            .links
            .iter()
            .map(|link| {
                link.and_then(|to| {
                    self.stages[to.0]
                        .base()
                        .inbound()
                        .and_then(|queue| queue.writer())
                })
            })
            .collect();

        for stage in &mut self.stages {
            if let Some(queue) = stage.base_mut().inbound_mut() {
                queue.seal();
            }
        }

        for (stage, writer) in self.stages.iter_mut().zip(writers) {
            stage.init(writer).map_err(|e| Error::StageInit {
                stage: stage.name().to_string(),
                message: e.to_string(),
            })?;
        }

        log::debug!("Pipeline built with {} stages", self.stages.len());
        Ok(Pipeline {
            names: self.stages.iter().map(|s| s.name().to_string()).collect(),
            stages: self
                .stages
                .into_iter()
                .map(|stage| Arc::new(Mutex::new(stage)))
                .collect(),
            links: self.links,
            torn_down: false,
        })
    }
}

/// A built, initialized set of stages.
pub struct Pipeline {
    stages: Vec<SharedStage>,
    names: Vec<String>,
    links: Vec<Option<StageId>>,
    torn_down: bool,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Chains `stages` in order, each feeding the next.
    pub fn linear(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let mut builder = PipelineBuilder::new();
        let ids: Vec<StageId> = stages
            .into_iter()
            .map(|stage| builder.add_boxed(stage))
            .collect();
        for pair in ids.windows(2) {
            builder.link(pair[0], pair[1])?;
        }
        builder.build()
    }

    /// Submits one task per stage.
    pub fn register(&self, scheduler: &TaskScheduler) -> Vec<TaskId> {
        self.stages
            .iter()
            .zip(&self.names)
            .map(|(stage, name)| {
                let stage = Arc::clone(stage);
                scheduler.submit(name.clone(), move || match stage.try_lock() {
                    Ok(mut stage) => stage.run(),
                    // Held by an inspector or teardown, not by another worker
                    Err(TryLockError::WouldBlock) => Ok(Progress::Idle),
                    Err(TryLockError::Poisoned(_)) => Err(StageError::Fatal(
                        "stage state was poisoned by an earlier panic".to_string(),
                    )),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = StageId> + '_ {
        (0..self.stages.len()).map(StageId)
    }

    pub fn name(&self, id: StageId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }

    pub fn downstream_of(&self, id: StageId) -> Option<StageId> {
        self.links.get(id.0).copied().flatten()
    }

    pub fn lifecycle(&self, id: StageId) -> Option<Lifecycle> {
        self.stages.get(id.0).map(|stage| lock_stage(stage).lifecycle())
    }

    pub fn metrics(&self, id: StageId) -> Option<StageMetrics> {
        self.stages.get(id.0).map(|stage| lock_stage(stage).metrics())
    }

    /// Name and lifecycle of every stage, in insertion order.
    pub fn states(&self) -> Vec<(String, Lifecycle)> {
        self.stages
            .iter()
            .zip(&self.names)
            .map(|(stage, name)| (name.clone(), lock_stage(stage).lifecycle()))
            .collect()
    }

    /// True once no stage can make progress anymore.
    pub fn is_drained(&self) -> bool {
        self.stages
            .iter()
            .all(|stage| lock_stage(stage).lifecycle().is_finished())
    }

    /// Polls until the pipeline drains or `timeout` elapses.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let poll = Duration::from_millis(defaults::DRAIN_POLL_MS);
        loop {
            if self.is_drained() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(poll.min(deadline - now));
        }
    }

    /// Deinitializes every stage. Later calls are no-ops.
    ///
    /// Stop the scheduler first: a stage deinitialized while its task is
    /// still scheduled only ever reports Idle.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        for stage in &self.stages {
            lock_stage(stage).deinit();
        }
        log::debug!("Pipeline torn down");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
