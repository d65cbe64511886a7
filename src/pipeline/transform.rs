//! Transform stage: the Decode/Encode slot between a source and a sink.

use crate::pipeline::error::StageError;
use crate::pipeline::queue::{Dequeued, InterStageQueue};
use crate::pipeline::stage::{Stage, StageBase};
use crate::pipeline::types::Buffer;
use crate::scheduler::Progress;
use std::time::Duration;

/// Per-buffer processing step.
///
/// Returning `Ok(None)` consumes the buffer without producing output
/// (e.g. a decoder still waiting for more input).
pub trait Transform: Send + 'static {
    fn apply(&mut self, buffer: Buffer) -> Result<Option<Buffer>, StageError>;
}

impl<F> Transform for F
where
    F: FnMut(Buffer) -> Result<Option<Buffer>, StageError> + Send + 'static,
{
    fn apply(&mut self, buffer: Buffer) -> Result<Option<Buffer>, StageError> {
        self(buffer)
    }
}

/// Forwards every buffer unchanged.
#[derive(Debug, Default)]
pub struct Passthrough;

impl Transform for Passthrough {
    fn apply(&mut self, buffer: Buffer) -> Result<Option<Buffer>, StageError> {
        Ok(Some(buffer))
    }
}

pub struct TransformStage {
    base: StageBase,
    transform: Box<dyn Transform>,
}

impl TransformStage {
    pub fn new(name: impl Into<String>, queue: InterStageQueue, transform: impl Transform) -> Self {
        Self {
            base: StageBase::with_inbound(name, queue),
            transform: Box::new(transform),
        }
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.base = self.base.with_dequeue_timeout(timeout);
        self
    }
}

impl Stage for TransformStage {
    fn base(&self) -> &StageBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StageBase {
        &mut self.base
    }

    fn step(&mut self) -> Result<Progress, StageError> {
        // A parked buffer goes out before anything new is pulled in
        if let Some(progress) = self.base.flush_pending() {
            return Ok(progress);
        }

        match self.base.dequeue() {
            Dequeued::Item(buffer) => {
                self.base.record(&buffer);
                match self.transform.apply(buffer)? {
                    Some(output) => Ok(self.base.forward(output)),
                    None => Ok(Progress::Busy),
                }
            }
            Dequeued::Empty => Ok(Progress::Idle),
            Dequeued::Closed => {
                self.base.drain();
                Ok(Progress::Idle)
            }
        }
    }
}
