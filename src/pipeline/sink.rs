use crate::media::{MediaError, MediaLibrary, MediaOutput};
use crate::pipeline::error::StageError;
use crate::pipeline::queue::{Dequeued, InterStageQueue};
use crate::pipeline::stage::{Stage, StageBase};
use crate::pipeline::types::Buffer;
use crate::scheduler::Progress;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Pluggable terminal handler for buffers leaving the pipeline.
pub trait PacketSink: Send + 'static {
    /// Handles one buffer.
    fn consume(&mut self, buffer: Buffer) -> Result<(), StageError>;

    /// Called once when the input is exhausted or the stage is torn down.
    fn finish(&mut self) {}

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Drops every buffer.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl PacketSink for DiscardSink {
    fn consume(&mut self, _buffer: Buffer) -> Result<(), StageError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discard"
    }
}

/// Shared view of the buffers gathered by a [`CollectorSink`].
#[derive(Debug, Clone, Default)]
pub struct Collected {
    buffers: Arc<Mutex<Vec<Buffer>>>,
    finished: Arc<Mutex<bool>>,
}

impl Collected {
    fn lock(&self) -> MutexGuard<'_, Vec<Buffer>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies out the payloads in arrival order.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.lock().iter().map(|b| b.data().to_vec()).collect()
    }

    /// Sequence numbers in arrival order.
    pub fn sequences(&self) -> Vec<u64> {
        self.lock().iter().map(Buffer::sequence).collect()
    }

    /// Moves the collected buffers out.
    pub fn take(&self) -> Vec<Buffer> {
        std::mem::take(&mut *self.lock())
    }

    /// True once the sink saw the end of its input.
    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collects buffers in memory for later inspection.
#[derive(Debug, Default)]
pub struct CollectorSink {
    collected: Collected,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle that stays valid after the sink moves into a stage.
    pub fn handle(&self) -> Collected {
        self.collected.clone()
    }
}

impl PacketSink for CollectorSink {
    fn consume(&mut self, buffer: Buffer) -> Result<(), StageError> {
        self.collected.lock().push(buffer);
        Ok(())
    }

    fn finish(&mut self) {
        *self
            .collected
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Writes each buffer to a media library output.
pub struct WriterSink {
    target: String,
    output: Option<Box<dyn MediaOutput>>,
}

impl WriterSink {
    /// Opens `target` for writing.
    pub fn open(media: &dyn MediaLibrary, target: &str) -> Result<Self, MediaError> {
        let output = media.open_output(target)?;
        Ok(Self {
            target: target.to_string(),
            output: Some(output),
        })
    }
}

impl PacketSink for WriterSink {
    fn consume(&mut self, buffer: Buffer) -> Result<(), StageError> {
        let output = self.output.as_mut().ok_or_else(|| {
            StageError::Fatal(format!("output '{}' is already closed", self.target))
        })?;
        output.write_packet(buffer.data()).map_err(|e| match e {
            MediaError::Closed => StageError::Fatal(format!("output '{}': {}", self.target, e)),
            e => StageError::Recoverable(format!(
                "dropped packet #{} for '{}': {}",
                buffer.sequence(),
                self.target,
                e
            )),
        })
    }

    fn finish(&mut self) {
        if let Some(mut output) = self.output.take()
            && let Err(e) = output.close()
        {
            log::error!("Failed to close output '{}': {}", self.target, e);
        }
    }

    fn name(&self) -> &'static str {
        "writer"
    }
}

/// Terminal stage: dequeues one buffer per step and hands it to its sink.
pub struct SinkStage {
    base: StageBase,
    sink: Box<dyn PacketSink>,
    finished: bool,
}

impl SinkStage {
    pub fn new(name: impl Into<String>, queue: InterStageQueue, sink: impl PacketSink) -> Self {
        Self {
            base: StageBase::with_inbound(name, queue),
            sink: Box::new(sink),
            finished: false,
        }
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.base = self.base.with_dequeue_timeout(timeout);
        self
    }

    fn finish_sink(&mut self) {
        if !self.finished {
            self.finished = true;
            log::debug!(
                "[{}] {} sink finished after {} buffers",
                self.base.name(),
                self.sink.name(),
                self.base.metrics().processed
            );
            self.sink.finish();
        }
    }
}

impl Stage for SinkStage {
    fn base(&self) -> &StageBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StageBase {
        &mut self.base
    }

    fn step(&mut self) -> Result<Progress, StageError> {
        match self.base.dequeue() {
            Dequeued::Item(buffer) => {
                let len = buffer.len();
                self.sink.consume(buffer)?;
                self.base.record_len(len);
                Ok(Progress::Busy)
            }
            Dequeued::Empty => Ok(Progress::Idle),
            Dequeued::Closed => {
                self.finish_sink();
                self.base.drain();
                Ok(Progress::Idle)
            }
        }
    }

    fn reset(&mut self) {
        self.finished = false;
    }

    fn produces_output(&self) -> bool {
        false
    }

    fn release(&mut self) {
        self.finish_sink();
    }
}
