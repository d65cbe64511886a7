//! In-memory media library for tests, benchmarks and dry runs.

use crate::media::{MediaError, MediaInput, MediaLibrary, MediaOutput, ReadOutcome, StreamInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Default)]
struct StreamSpec {
    packets: Vec<Vec<u8>>,
    probe_failure: bool,
    transient_errors: usize,
    corrupt_after: Option<usize>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, StreamSpec>,
    outputs: HashMap<String, Vec<Vec<u8>>>,
    write_errors: HashMap<String, usize>,
}

/// Mock media library holding named packet streams.
///
/// Cloning yields another handle onto the same streams and captured outputs.
#[derive(Debug, Clone, Default)]
pub struct SyntheticMedia {
    inner: Arc<Mutex<Inner>>,
}

impl SyntheticMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stream under `source` that yields the given packets.
    pub fn with_stream(self, source: &str, packets: Vec<Vec<u8>>) -> Self {
        self.update(source, |spec| spec.packets = packets);
        self
    }

    /// Registers a stream of `count` packets whose payloads are `packet-<n>`.
    pub fn with_numbered_stream(self, source: &str, count: usize) -> Self {
        let packets = (0..count)
            .map(|n| format!("packet-{}", n).into_bytes())
            .collect();
        self.with_stream(source, packets)
    }

    /// Makes `find_stream_info` fail for `source`.
    pub fn with_probe_failure(self, source: &str) -> Self {
        self.update(source, |spec| spec.probe_failure = true);
        self
    }

    /// Makes the first `count` reads of `source` fail with a transient error.
    pub fn with_transient_errors(self, source: &str, count: usize) -> Self {
        self.update(source, |spec| spec.transient_errors = count);
        self
    }

    /// Makes reads of `source` report a closed handle after `packets` packets.
    pub fn with_corrupt_handle_after(self, source: &str, packets: usize) -> Self {
        self.update(source, |spec| spec.corrupt_after = Some(packets));
        self
    }

    /// Makes the next `count` writes to `target` fail with an I/O error.
    pub fn with_write_errors(self, target: &str, count: usize) -> Self {
        self.lock().write_errors.insert(target.to_string(), count);
        self
    }

    /// Returns the packets written to `target` so far.
    pub fn written(&self, target: &str) -> Vec<Vec<u8>> {
        self.lock().outputs.get(target).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, source: &str, f: impl FnOnce(&mut StreamSpec)) {
        let mut inner = self.lock();
        f(inner.streams.entry(source.to_string()).or_default());
    }
}

impl MediaLibrary for SyntheticMedia {
    fn open_input(&self, source: &str) -> Result<Box<dyn MediaInput>, MediaError> {
        let spec = self
            .lock()
            .streams
            .get(source)
            .cloned()
            .ok_or_else(|| MediaError::NotFound {
                source_name: source.to_string(),
            })?;
        Ok(Box::new(SyntheticInput {
            source: source.to_string(),
            spec,
            position: 0,
            open: true,
        }))
    }

    fn open_output(&self, target: &str) -> Result<Box<dyn MediaOutput>, MediaError> {
        self.lock().outputs.insert(target.to_string(), Vec::new());
        Ok(Box::new(SyntheticOutput {
            target: target.to_string(),
            inner: Arc::clone(&self.inner),
            open: true,
        }))
    }
}

struct SyntheticInput {
    source: String,
    spec: StreamSpec,
    position: usize,
    open: bool,
}

impl MediaInput for SyntheticInput {
    fn find_stream_info(&mut self) -> Result<StreamInfo, MediaError> {
        if !self.open {
            return Err(MediaError::Closed);
        }
        if self.spec.probe_failure {
            return Err(MediaError::Unsupported {
                source_name: self.source.clone(),
                message: "no decodable streams".to_string(),
            });
        }
        Ok(StreamInfo {
            format: "synthetic".to_string(),
            streams: 1,
            size_hint: Some(self.spec.packets.iter().map(|p| p.len() as u64).sum()),
        })
    }

    fn read_packet(&mut self) -> Result<ReadOutcome, MediaError> {
        if !self.open {
            return Err(MediaError::Closed);
        }
        if self.spec.transient_errors > 0 {
            self.spec.transient_errors -= 1;
            return Err(MediaError::WouldBlock);
        }
        if self.spec.corrupt_after == Some(self.position) {
            return Err(MediaError::Closed);
        }
        match self.spec.packets.get(self.position) {
            Some(packet) => {
                self.position += 1;
                Ok(ReadOutcome::Packet(packet.clone()))
            }
            None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

struct SyntheticOutput {
    target: String,
    inner: Arc<Mutex<Inner>>,
    open: bool,
}

impl MediaOutput for SyntheticOutput {
    fn write_packet(&mut self, data: &[u8]) -> Result<(), MediaError> {
        if !self.open {
            return Err(MediaError::Closed);
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(remaining) = inner.write_errors.get_mut(&self.target)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(MediaError::Io(std::io::Error::other("write failed")));
        }
        inner
            .outputs
            .entry(self.target.clone())
            .or_default()
            .push(data.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), MediaError> {
        self.open = false;
        Ok(())
    }
}
