//! Source stage: reads packets from the media library.

use crate::media::{MediaError, MediaInput, MediaLibrary, ReadOutcome, StreamInfo};
use crate::pipeline::error::StageError;
use crate::pipeline::stage::{Stage, StageBase};
use crate::pipeline::types::Buffer;
use crate::scheduler::Progress;
use std::sync::Arc;

/// Internal state machine of a [`SourceStage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Input not opened yet (or opening failed).
    Init,
    /// Reading one packet per step.
    Reading,
    /// Terminal.
    EndOfStream,
}

/// Opens an input through the media library and feeds its packets
/// downstream, one packet per step.
pub struct SourceStage {
    base: StageBase,
    source: String,
    media: Arc<dyn MediaLibrary>,
    state: SourceState,
    input: Option<Box<dyn MediaInput>>,
    stream_info: Option<StreamInfo>,
    open_error: Option<String>,
    sequence: u64,
}

impl SourceStage {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        media: Arc<dyn MediaLibrary>,
    ) -> Self {
        Self {
            base: StageBase::new(name),
            source: source.into(),
            media,
            state: SourceState::Init,
            input: None,
            stream_info: None,
            open_error: None,
            sequence: 0,
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stream information from a successful probe.
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// Why opening the input failed, if it did.
    pub fn open_error(&self) -> Option<&str> {
        self.open_error.as_deref()
    }

    fn open(&self) -> Result<(Box<dyn MediaInput>, StreamInfo), MediaError> {
        let mut input = self.media.open_input(&self.source)?;
        match input.find_stream_info() {
            Ok(info) => Ok((input, info)),
            Err(e) => {
                input.close();
                Err(e)
            }
        }
    }

    fn step_init(&mut self) -> Progress {
        // Open failures are latched: reported once, then the stage stays put.
        if self.open_error.is_some() {
            return Progress::Idle;
        }
        match self.open() {
            Ok((input, info)) => {
                log::info!("[{}] opened '{}': {}", self.base.name(), self.source, info);
                self.input = Some(input);
                self.stream_info = Some(info);
                self.state = SourceState::Reading;
                Progress::Busy
            }
            Err(e) => {
                log::error!(
                    "[{}] could not open input '{}': {}",
                    self.base.name(),
                    self.source,
                    e
                );
                self.open_error = Some(e.to_string());
                Progress::Idle
            }
        }
    }

    fn step_reading(&mut self) -> Result<Progress, StageError> {
        if let Some(progress) = self.base.flush_pending() {
            return Ok(progress);
        }
        let Some(input) = self.input.as_mut() else {
            return Ok(Progress::Idle);
        };

        match input.read_packet() {
            Ok(ReadOutcome::Packet(data)) => {
                let buffer = Buffer::new(data, self.sequence);
                self.sequence += 1;
                self.base.record(&buffer);
                Ok(self.base.forward(buffer))
            }
            Ok(ReadOutcome::EndOfStream) => {
                log::info!(
                    "[{}] end of stream after {} packets",
                    self.base.name(),
                    self.sequence
                );
                self.close_input();
                self.state = SourceState::EndOfStream;
                self.base.drain();
                Ok(Progress::Idle)
            }
            Err(MediaError::WouldBlock) => Ok(Progress::Idle),
            Err(MediaError::Closed) => Err(StageError::Fatal(format!(
                "input '{}' handle is no longer usable",
                self.source
            ))),
            Err(e) => {
                log::debug!("[{}] read failed, retrying: {}", self.base.name(), e);
                Ok(Progress::Idle)
            }
        }
    }

    fn close_input(&mut self) {
        if let Some(mut input) = self.input.take() {
            input.close();
        }
    }
}

impl Stage for SourceStage {
    fn base(&self) -> &StageBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StageBase {
        &mut self.base
    }

    fn step(&mut self) -> Result<Progress, StageError> {
        match self.state {
            SourceState::Init => Ok(self.step_init()),
            SourceState::Reading => self.step_reading(),
            SourceState::EndOfStream => Ok(Progress::Idle),
        }
    }

    fn reset(&mut self) {
        self.close_input();
        self.state = SourceState::Init;
        self.stream_info = None;
        self.open_error = None;
        self.sequence = 0;
    }

    fn release(&mut self) {
        self.close_input();
    }
}
