//! Core stage abstraction.
//!
//! A stage is a state machine driven one bounded step at a time by the
//! scheduler. Concrete stages embed a [`StageBase`] and implement
//! [`Stage::step`]; the lifecycle bookkeeping lives in the trait's
//! provided methods.

use crate::defaults;
use crate::pipeline::error::StageError;
use crate::pipeline::queue::{Dequeued, EnqueueError, InterStageQueue, QueueWriter};
use crate::pipeline::types::{Buffer, StageMetrics};
use crate::scheduler::Progress;
use std::fmt;
use std::time::Duration;

/// Externally visible lifecycle of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, `init` not called yet.
    Uninitialized,
    /// Bound and being driven.
    Ready,
    /// Reached a terminal internal state; every further step is Idle.
    Draining,
    /// Deinitialized; queues and downstream released.
    Closed,
}

impl Lifecycle {
    /// True once the stage will never make progress again.
    pub fn is_finished(self) -> bool {
        matches!(self, Lifecycle::Draining | Lifecycle::Closed)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Ready => "ready",
            Lifecycle::Draining => "draining",
            Lifecycle::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State shared by every stage kind.
#[derive(Debug)]
pub struct StageBase {
    name: String,
    lifecycle: Lifecycle,
    next: Option<QueueWriter>,
    inbound: Option<InterStageQueue>,
    dequeue_timeout: Duration,
    /// Buffer the downstream queue rejected as full; retried first.
    pending: Option<Buffer>,
    metrics: StageMetrics,
}

impl StageBase {
    /// Base for a stage without an inbound queue (a source).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: Lifecycle::Uninitialized,
            next: None,
            inbound: None,
            dequeue_timeout: Duration::from_millis(defaults::DEQUEUE_TIMEOUT_MS),
            pending: None,
            metrics: StageMetrics::default(),
        }
    }

    /// Base for a consuming stage that owns `queue`.
    pub fn with_inbound(name: impl Into<String>, queue: InterStageQueue) -> Self {
        Self {
            inbound: Some(queue),
            ..Self::new(name)
        }
    }

    /// Sets how long a step waits on the inbound queue.
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn metrics(&self) -> StageMetrics {
        self.metrics
    }

    pub fn has_downstream(&self) -> bool {
        self.next.is_some()
    }

    pub fn inbound(&self) -> Option<&InterStageQueue> {
        self.inbound.as_ref()
    }

    pub fn inbound_mut(&mut self) -> Option<&mut InterStageQueue> {
        self.inbound.as_mut()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Counts a buffer this stage produced or consumed.
    pub fn record(&mut self, buffer: &Buffer) {
        self.metrics.record(buffer);
    }

    /// Counts a buffer of `len` bytes that has already been handed off.
    pub fn record_len(&mut self, len: usize) {
        self.metrics.processed += 1;
        self.metrics.bytes += len as u64;
    }

    /// Waits up to the dequeue timeout for the next inbound buffer.
    ///
    /// A stage without an inbound queue reports `Closed`.
    pub fn dequeue(&self) -> Dequeued {
        match &self.inbound {
            Some(queue) => queue.dequeue(self.dequeue_timeout),
            None => Dequeued::Closed,
        }
    }

    /// Hands a buffer to the downstream stage.
    ///
    /// Without a downstream the buffer is dropped. A full downstream queue
    /// parks the buffer as pending and reports Idle; the caller retries it
    /// with [`StageBase::flush_pending`] on the next step.
    pub fn forward(&mut self, buffer: Buffer) -> Progress {
        let Some(next) = &self.next else {
            return Progress::Busy;
        };
        match next.enqueue(buffer) {
            Ok(()) => Progress::Busy,
            Err(EnqueueError::Full(buffer)) => {
                self.pending = Some(buffer);
                Progress::Idle
            }
            Err(EnqueueError::Closed(buffer)) => {
                log::warn!(
                    "[{}] downstream closed, dropping buffer #{}",
                    self.name,
                    buffer.sequence()
                );
                self.next = None;
                Progress::Idle
            }
        }
    }

    /// Retries a parked buffer. Returns `None` when nothing was pending.
    pub fn flush_pending(&mut self) -> Option<Progress> {
        let buffer = self.pending.take()?;
        Some(self.forward(buffer))
    }

    /// Moves `Ready -> Draining` and releases the downstream writer so the
    /// next stage can observe the end of its input.
    pub fn drain(&mut self) {
        if self.lifecycle == Lifecycle::Ready {
            log::debug!("[{}] draining", self.name);
            self.lifecycle = Lifecycle::Draining;
        }
        self.next = None;
    }

    fn bind(&mut self, next: Option<QueueWriter>) {
        self.next = next;
        self.pending = None;
        self.lifecycle = Lifecycle::Ready;
    }

    fn release(&mut self) {
        self.next = None;
        if let Some(buffer) = self.pending.take() {
            log::debug!(
                "[{}] discarding pending buffer #{}",
                self.name,
                buffer.sequence()
            );
        }
        if let Some(queue) = self.inbound.take() {
            let discarded = queue.clear();
            if discarded > 0 {
                log::debug!("[{}] discarded {} queued buffers", self.name, discarded);
            }
        }
        self.lifecycle = Lifecycle::Closed;
    }
}

/// A schedulable pipeline stage.
pub trait Stage: Send + 'static {
    fn base(&self) -> &StageBase;

    fn base_mut(&mut self) -> &mut StageBase;

    /// Executes one bounded step of stage-specific work.
    ///
    /// Only called while the stage is `Ready` or `Draining`. Must not wait
    /// longer than the inbound dequeue timeout.
    fn step(&mut self) -> Result<Progress, StageError>;

    /// Resets the internal state machine to its initial variant.
    fn reset(&mut self) {}

    /// Releases stage-specific resources.
    fn release(&mut self) {}

    /// False for terminal stages, which never forward buffers downstream.
    fn produces_output(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.base().lifecycle()
    }

    fn metrics(&self) -> StageMetrics {
        self.base().metrics()
    }

    /// Binds the downstream writer and resets internal state.
    ///
    /// Must be called exactly once, before scheduling.
    fn init(&mut self, next: Option<QueueWriter>) -> Result<(), StageError> {
        if self.lifecycle() != Lifecycle::Uninitialized {
            return Err(StageError::Fatal(format!(
                "stage '{}' is already {}",
                self.name(),
                self.lifecycle()
            )));
        }
        self.base_mut().bind(next);
        self.reset();
        Ok(())
    }

    /// Runs one step. Uninitialized and closed stages always report Idle.
    fn run(&mut self) -> Result<Progress, StageError> {
        match self.lifecycle() {
            Lifecycle::Uninitialized | Lifecycle::Closed => Ok(Progress::Idle),
            Lifecycle::Ready | Lifecycle::Draining => self.step(),
        }
    }

    /// Releases queues and the downstream writer. Later calls are no-ops.
    fn deinit(&mut self) {
        if self.lifecycle() == Lifecycle::Closed {
            return;
        }
        self.release();
        self.base_mut().release();
        log::debug!("[{}] closed", self.name());
    }
}
