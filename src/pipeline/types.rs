//! Data types moved between pipeline stages.

/// One unit of media data (a packet or frame payload).
///
/// Immutable once built. Buffers are moved from producer to queue to
/// consumer and never shared, so there is no `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    sequence: u64,
}

impl Buffer {
    /// Creates a new buffer with the producer's sequence number.
    pub fn new(data: Vec<u8>, sequence: u64) -> Self {
        Self { data, sequence }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Position of this buffer in its producer's output.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the buffer and returns its payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Per-stage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageMetrics {
    /// Buffers this stage produced or consumed.
    pub processed: u64,
    /// Payload bytes across those buffers.
    pub bytes: u64,
}

impl StageMetrics {
    pub(crate) fn record(&mut self, buffer: &Buffer) {
        self.processed += 1;
        self.bytes += buffer.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = Buffer::new(vec![1, 2, 3], 7);

        assert_eq!(buffer.data(), &[1, 2, 3]);
        assert_eq!(buffer.sequence(), 7);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.into_data(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = Buffer::new(Vec::new(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_metrics_record() {
        let mut metrics = StageMetrics::default();
        metrics.record(&Buffer::new(vec![0; 10], 0));
        metrics.record(&Buffer::new(vec![0; 5], 1));

        assert_eq!(metrics.processed, 2);
        assert_eq!(metrics.bytes, 15);
    }
}
