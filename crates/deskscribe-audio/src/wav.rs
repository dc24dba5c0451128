//! Incremental WAV writer
//!
//! Streams PCM to disk while keeping the RIFF header honest: after every
//! write the two 32-bit size fields are patched to match the bytes actually
//! flushed, so the file on disk is a structurally valid, playable WAV at any
//! moment. A crash mid-recording loses at most the samples that never
//! reached `write_samples`; there is no separate finalize step the file
//! depends on.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// RIFF chunk + 16-byte fmt chunk + data chunk descriptor.
const HEADER_LEN: u64 = 44;

/// The data-size field is 32-bit and the RIFF size is data + 36, so this is
/// the hard ceiling on sample bytes a single file can hold.
pub const MAX_DATA_BYTES: u64 = (u32::MAX - 36) as u64;

#[derive(Debug, Error)]
pub enum WavWriterError {
    #[error("wav writer I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav data would reach {requested} bytes, past the 32-bit container limit")]
    CapacityExceeded { requested: u64 },
    #[error("wav writer for {path} is already closed")]
    Closed { path: PathBuf },
}

/// PCM format of one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmSpec {
    pub fn mono_16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

struct Inner {
    file: Option<File>,
    data_bytes: u64,
}

/// Append-only WAV output bound to one file.
///
/// All public methods serialise on an internal lock: the capture callback is
/// the single producer in normal use, but a foreground thread may safely
/// force-close the writer while the callback still holds a reference. Writes
/// after close fail with [`WavWriterError::Closed`].
pub struct IncrementalWavWriter {
    path: PathBuf,
    spec: PcmSpec,
    inner: Mutex<Inner>,
}

impl IncrementalWavWriter {
    /// Create the file and write a header with zeroed size fields.
    pub fn create(path: impl AsRef<Path>, spec: PcmSpec) -> Result<Self, WavWriterError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path)?;
        file.write_all(&header_bytes(spec, 0))?;

        tracing::debug!(
            path = %path.display(),
            rate = spec.sample_rate,
            channels = spec.channels,
            "wav writer opened"
        );

        Ok(Self {
            path,
            spec,
            inner: Mutex::new(Inner {
                file: Some(file),
                data_bytes: 0,
            }),
        })
    }

    /// Append i16 samples (interleaved when multi-channel).
    pub fn write_samples(&self, samples: &[i16]) -> Result<(), WavWriterError> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.write_bytes(&bytes)
    }

    /// Append raw little-endian PCM bytes.
    ///
    /// On success the file's header size fields already reflect the new
    /// total; the data lands before the header patch so an interruption
    /// between the two understates (never overstates) the data size.
    pub fn write_bytes(&self, pcm: &[u8]) -> Result<(), WavWriterError> {
        if pcm.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let Inner { file, data_bytes } = &mut *inner;
        let file = file.as_mut().ok_or_else(|| WavWriterError::Closed {
            path: self.path.clone(),
        })?;

        let new_total = *data_bytes + pcm.len() as u64;
        if new_total > MAX_DATA_BYTES {
            return Err(WavWriterError::CapacityExceeded {
                requested: new_total,
            });
        }

        file.write_all(pcm)?;
        *data_bytes = new_total;
        patch_size_fields(file, new_total as u32)?;

        Ok(())
    }

    /// Final header patch, fsync, release the file handle. Idempotent.
    pub fn close(&self) -> Result<(), WavWriterError> {
        let mut inner = self.inner.lock();
        let Some(mut file) = inner.file.take() else {
            return Ok(());
        };

        patch_size_fields(&mut file, inner.data_bytes as u32)?;
        file.sync_all()?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = inner.data_bytes,
            "wav writer closed"
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().file.is_none()
    }

    /// Sample bytes written so far (excludes the header).
    pub fn bytes_written(&self) -> u64 {
        self.inner.lock().data_bytes
    }

    /// Audio duration represented by the bytes written so far.
    pub fn duration_secs(&self) -> f64 {
        self.bytes_written() as f64 / self.spec.byte_rate() as f64
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> PcmSpec {
        self.spec
    }
}

impl Drop for IncrementalWavWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), "wav writer close on drop failed: {e}");
        }
    }
}

/// Canonical 44-byte PCM header with the given data size.
fn header_bytes(spec: PcmSpec, data_size: u32) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    let riff_size = 36 + data_size;

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&spec.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&spec.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&spec.bits_per_sample.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Rewrite the RIFF size (offset 4) and data size (offset 40), then return
/// the cursor to the end for the next append.
fn patch_size_fields(file: &mut File, data_size: u32) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&(36 + data_size).to_le_bytes())?;
    file.seek(SeekFrom::Start(40))?;
    file.write_all(&data_size.to_le_bytes())?;
    file.seek(SeekFrom::End(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn read_back(path: &Path) -> (hound::WavSpec, Vec<i16>) {
        let mut reader = hound::WavReader::open(path).expect("file should be a valid wav");
        let spec = reader.spec();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn file_is_valid_after_every_write_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let writer = IncrementalWavWriter::create(&path, PcmSpec::mono_16(16000)).unwrap();

        // Zero writes: header alone must already parse
        let (spec, samples) = read_back(&path);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.channels, 1);
        assert!(samples.is_empty());

        let chunk: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
        for written in 1..=4 {
            writer.write_samples(&chunk).unwrap();
            // No close, no flush: the path must still read back whole
            let (_, samples) = read_back(&path);
            assert_eq!(samples.len(), chunk.len() * written);
        }

        writer.close().unwrap();
        let (_, samples) = read_back(&path);
        assert_eq!(samples.len(), chunk.len() * 4);
    }

    #[test]
    fn declared_sizes_match_bytes_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sizes.wav");
        let writer = IncrementalWavWriter::create(&path, PcmSpec::mono_16(8000)).unwrap();
        writer.write_samples(&[1i16; 500]).unwrap();

        let raw = std::fs::read(&path).unwrap();
        let riff_size = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let data_size = u32::from_le_bytes(raw[40..44].try_into().unwrap());
        assert_eq!(data_size, 1000);
        assert_eq!(riff_size, 1036);
        assert_eq!(raw.len() as u32, 44 + data_size);
        assert_eq!(writer.bytes_written(), 1000);
    }

    #[test]
    fn capacity_ceiling_is_enforced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cap.wav");
        let writer = IncrementalWavWriter::create(&path, PcmSpec::mono_16(16000)).unwrap();
        writer.inner.lock().data_bytes = MAX_DATA_BYTES - 10;

        let err = writer.write_samples(&[0i16; 32]).unwrap_err();
        assert!(matches!(err, WavWriterError::CapacityExceeded { .. }));
        // The rejected write must not advance the counter
        assert_eq!(writer.bytes_written(), MAX_DATA_BYTES - 10);
    }

    #[test]
    fn close_is_idempotent_and_writes_fail_after() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("closed.wav");
        let writer = IncrementalWavWriter::create(&path, PcmSpec::mono_16(16000)).unwrap();
        writer.write_samples(&[0i16; 16]).unwrap();

        writer.close().unwrap();
        writer.close().unwrap();

        let err = writer.write_samples(&[0i16; 16]).unwrap_err();
        assert!(matches!(err, WavWriterError::Closed { .. }));
    }

    #[test]
    fn foreground_thread_can_force_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forced.wav");
        let writer = Arc::new(IncrementalWavWriter::create(&path, PcmSpec::mono_16(16000)).unwrap());

        let producer = {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                // Keep writing until the other thread closes us out
                loop {
                    match writer.write_samples(&[7i16; 160]) {
                        Ok(()) => {}
                        Err(WavWriterError::Closed { .. }) => break,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        writer.close().unwrap();
        producer.join().unwrap();

        let (_, samples) = read_back(&path);
        assert_eq!(samples.len() as u64 * 2, writer.bytes_written());
    }

    #[test]
    fn duration_tracks_sample_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dur.wav");
        let writer = IncrementalWavWriter::create(&path, PcmSpec::mono_16(16000)).unwrap();
        writer.write_samples(&vec![0i16; 16000]).unwrap();
        assert!((writer.duration_secs() - 1.0).abs() < 1e-9);
    }
}
