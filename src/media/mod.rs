//! Media library boundary.
//!
//! Container parsing and codec work are delegated to an external library.
//! The pipeline only sees the capability set below: open an input, probe
//! it, read packets until end of stream, write packets to an output, close.

pub mod file;
pub mod synthetic;

pub use file::FileMedia;
pub use synthetic::SyntheticMedia;

use std::fmt;
use thiserror::Error;

/// Errors reported by a media library backend.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Could not open input '{source_name}'")]
    NotFound { source_name: String },

    #[error("Unsupported media '{source_name}': {message}")]
    Unsupported {
        source_name: String,
        message: String,
    },

    #[error("Invalid media data: {message}")]
    InvalidData { message: String },

    /// No packet is available right now; try again on a later step.
    #[error("Resource temporarily unavailable")]
    WouldBlock,

    /// The handle was closed or is corrupt and cannot be used again.
    #[error("Media handle is closed")]
    Closed,

    #[error("Media I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a single packet read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Packet(Vec<u8>),
    EndOfStream,
}

/// Stream information gathered by probing an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Short container/format name.
    pub format: String,
    /// Number of elementary streams found.
    pub streams: usize,
    /// Total input size in bytes, when known.
    pub size_hint: Option<u64>,
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "format={} streams={}", self.format, self.streams)?;
        if let Some(size) = self.size_hint {
            write!(f, " size={}B", size)?;
        }
        Ok(())
    }
}

/// An opened input handle.
pub trait MediaInput: Send {
    /// Probes the input for stream information.
    fn find_stream_info(&mut self) -> Result<StreamInfo, MediaError>;

    /// Reads one packet without blocking.
    ///
    /// Returns `MediaError::WouldBlock` when nothing is available yet.
    fn read_packet(&mut self) -> Result<ReadOutcome, MediaError>;

    /// Releases the handle. Calling it twice is harmless.
    fn close(&mut self);
}

/// An opened output handle.
pub trait MediaOutput: Send {
    fn write_packet(&mut self, data: &[u8]) -> Result<(), MediaError>;

    /// Flushes and releases the handle. Calling it twice is harmless.
    fn close(&mut self) -> Result<(), MediaError>;
}

/// Entry points of a media library backend.
pub trait MediaLibrary: Send + Sync {
    fn open_input(&self, source: &str) -> Result<Box<dyn MediaInput>, MediaError>;

    fn open_output(&self, target: &str) -> Result<Box<dyn MediaOutput>, MediaError>;
}
