//! File-backed media library.
//!
//! Treats a regular file as a single opaque stream and cuts it into
//! fixed-size packets. Writing appends packets verbatim, so a
//! source -> sink pipeline over this backend is a byte-exact copy.

use crate::defaults;
use crate::media::{MediaError, MediaInput, MediaLibrary, MediaOutput, ReadOutcome, StreamInfo};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Media library over the local filesystem.
#[derive(Debug, Clone)]
pub struct FileMedia {
    packet_size: usize,
}

impl FileMedia {
    pub fn new(packet_size: usize) -> Self {
        Self {
            packet_size: packet_size.max(1),
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }
}

impl Default for FileMedia {
    fn default() -> Self {
        Self::new(defaults::PACKET_SIZE)
    }
}

impl MediaLibrary for FileMedia {
    fn open_input(&self, source: &str) -> Result<Box<dyn MediaInput>, MediaError> {
        let path = PathBuf::from(source);
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MediaError::NotFound {
                source_name: source.to_string(),
            },
            _ => MediaError::Io(e),
        })?;
        Ok(Box::new(FileInput {
            path,
            reader: Some(BufReader::new(file)),
            packet_size: self.packet_size,
        }))
    }

    fn open_output(&self, target: &str) -> Result<Box<dyn MediaOutput>, MediaError> {
        let file = File::create(target)?;
        Ok(Box::new(FileOutput {
            writer: Some(BufWriter::new(file)),
        }))
    }
}

struct FileInput {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    packet_size: usize,
}

fn format_name(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "raw".to_string())
}

impl MediaInput for FileInput {
    fn find_stream_info(&mut self) -> Result<StreamInfo, MediaError> {
        let reader = self.reader.as_ref().ok_or(MediaError::Closed)?;
        let metadata = reader.get_ref().metadata()?;
        if !metadata.is_file() {
            return Err(MediaError::Unsupported {
                source_name: self.path.display().to_string(),
                message: "not a regular file".to_string(),
            });
        }
        Ok(StreamInfo {
            format: format_name(&self.path),
            streams: 1,
            size_hint: Some(metadata.len()),
        })
    }

    fn read_packet(&mut self) -> Result<ReadOutcome, MediaError> {
        let reader = self.reader.as_mut().ok_or(MediaError::Closed)?;
        let mut data = Vec::with_capacity(self.packet_size);
        match reader
            .by_ref()
            .take(self.packet_size as u64)
            .read_to_end(&mut data)
        {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(_) => Ok(ReadOutcome::Packet(data)),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Err(MediaError::WouldBlock)
            }
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

struct FileOutput {
    writer: Option<BufWriter<File>>,
}

impl MediaOutput for FileOutput {
    fn write_packet(&mut self, data: &[u8]) -> Result<(), MediaError> {
        let writer = self.writer.as_mut().ok_or(MediaError::Closed)?;
        writer.write_all(data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), MediaError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to flush output on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn read_all(input: &mut dyn MediaInput) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        while let ReadOutcome::Packet(data) = input.read_packet().unwrap() {
            packets.push(data);
        }
        packets
    }

    #[test]
    fn test_open_missing_file_is_not_found() {
        let media = FileMedia::default();
        let result = media.open_input("/definitely/not/here.mp4");
        assert!(matches!(result, Err(MediaError::NotFound { .. })));
    }

    #[test]
    fn test_probe_reports_size_and_format() {
        let mut file = tempfile::Builder::new().suffix(".TS").tempfile().unwrap();
        file.write_all(&[0u8; 100]).unwrap();

        let media = FileMedia::default();
        let mut input = media.open_input(file.path().to_str().unwrap()).unwrap();
        let info = input.find_stream_info().unwrap();

        assert_eq!(info.format, "ts");
        assert_eq!(info.streams, 1);
        assert_eq!(info.size_hint, Some(100));
    }

    #[test]
    fn test_read_splits_into_packets() {
        let mut file = NamedTempFile::new().unwrap();
        let content: Vec<u8> = (0..10u8).collect();
        file.write_all(&content).unwrap();

        let media = FileMedia::new(4);
        let mut input = media.open_input(file.path().to_str().unwrap()).unwrap();
        let packets = read_all(input.as_mut());

        assert_eq!(packets, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
        // End of stream is sticky
        assert_eq!(input.read_packet().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn test_read_after_close_fails() {
        let file = NamedTempFile::new().unwrap();
        let media = FileMedia::default();
        let mut input = media.open_input(file.path().to_str().unwrap()).unwrap();

        input.close();
        input.close();

        assert!(matches!(input.read_packet(), Err(MediaError::Closed)));
        assert!(matches!(input.find_stream_info(), Err(MediaError::Closed)));
    }

    #[test]
    fn test_output_writes_packets_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let media = FileMedia::default();

        let mut output = media.open_output(target.to_str().unwrap()).unwrap();
        output.write_packet(b"abc").unwrap();
        output.write_packet(b"def").unwrap();
        output.close().unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"abcdef");
        assert!(matches!(output.write_packet(b"x"), Err(MediaError::Closed)));
    }

    #[test]
    fn test_zero_packet_size_is_clamped() {
        assert_eq!(FileMedia::new(0).packet_size(), 1);
    }
}
