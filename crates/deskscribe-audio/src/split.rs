//! Large-file splitting and compression
//!
//! Remote transcription backends cap the upload size. WAV inputs split
//! losslessly in process with hound; compressed inputs are re-encoded into
//! chunked 16 kHz mono WAV through FFmpeg. MP3 compression for smaller
//! uploads also runs through FFmpeg.

use anyhow::{bail, Context, Result};
use hound::{WavReader, WavWriter};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Byte rate of the chunks the FFmpeg path produces (16 kHz mono s16).
const FFMPEG_CHUNK_BYTE_RATE: u64 = 32_000;

/// Split `src` into ordered chunk files under `max_chunk_bytes` each,
/// named `<stem>_chunk_NNN.wav` inside `dest_dir`. WAV sources split
/// natively without re-encoding; everything else needs FFmpeg.
pub fn split_audio(
    src: &Path,
    dest_dir: &Path,
    stem: &str,
    max_chunk_bytes: u64,
) -> Result<Vec<PathBuf>> {
    let ext = src
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let chunks = if ext == "wav" {
        split_wav_native(src, dest_dir, stem, max_chunk_bytes)?
    } else {
        split_with_ffmpeg(src, dest_dir, stem, max_chunk_bytes)?
    };

    tracing::info!(
        source = %src.display(),
        count = chunks.len(),
        "split into chunks"
    );
    Ok(chunks)
}

fn split_wav_native(
    src: &Path,
    dest_dir: &Path,
    stem: &str,
    max_chunk_bytes: u64,
) -> Result<Vec<PathBuf>> {
    let mut reader =
        WavReader::open(src).with_context(|| format!("failed to open {}", src.display()))?;
    let spec = reader.spec();

    let block_align = spec.channels as u64 * (spec.bits_per_sample as u64 / 8);
    let byte_rate = spec.sample_rate as u64 * block_align;
    let chunk_secs = (max_chunk_bytes.saturating_sub(44) / byte_rate.max(1)).max(1);
    let samples_per_chunk = (chunk_secs * spec.sample_rate as u64) as usize * spec.channels as usize;

    match spec.sample_format {
        hound::SampleFormat::Int => {
            copy_chunked::<i32>(&mut reader, spec, dest_dir, stem, samples_per_chunk)
        }
        hound::SampleFormat::Float => {
            copy_chunked::<f32>(&mut reader, spec, dest_dir, stem, samples_per_chunk)
        }
    }
}

fn copy_chunked<S>(
    reader: &mut WavReader<BufReader<File>>,
    spec: hound::WavSpec,
    dest_dir: &Path,
    stem: &str,
    samples_per_chunk: usize,
) -> Result<Vec<PathBuf>>
where
    S: hound::Sample + Copy,
{
    let mut outputs: Vec<PathBuf> = Vec::new();
    let mut samples = reader.samples::<S>();

    // A chunk file is only created once a sample exists for it, so a source
    // that ends exactly on a boundary never leaves an empty trailing chunk.
    loop {
        let Some(first) = samples.next() else { break };

        let path = dest_dir.join(format!("{stem}_chunk_{:03}.wav", outputs.len()));
        let mut writer = WavWriter::create(&path, spec)
            .with_context(|| format!("failed to create {}", path.display()))?;
        outputs.push(path);

        writer.write_sample(first?)?;
        let mut written = 1usize;
        while written < samples_per_chunk {
            let Some(sample) = samples.next() else { break };
            writer.write_sample(sample?)?;
            written += 1;
        }
        writer.finalize()?;
    }

    Ok(outputs)
}

fn split_with_ffmpeg(
    src: &Path,
    dest_dir: &Path,
    stem: &str,
    max_chunk_bytes: u64,
) -> Result<Vec<PathBuf>> {
    let ffmpeg = find_ffmpeg()?;
    let duration = crate::file_io::probe_duration_secs(src)?;

    let chunk_secs = (max_chunk_bytes.saturating_sub(44) / FFMPEG_CHUNK_BYTE_RATE).max(1);
    let count = ((duration / chunk_secs as f64).ceil() as usize).max(1);

    let mut outputs = Vec::with_capacity(count);
    for i in 0..count {
        let start = i as u64 * chunk_secs;
        let path = dest_dir.join(format!("{stem}_chunk_{i:03}.wav"));

        let status = Command::new(&ffmpeg)
            .args(["-y", "-ss", &start.to_string(), "-t", &chunk_secs.to_string(), "-i"])
            .arg(src)
            .args(["-ar", "16000", "-ac", "1", "-f", "wav"])
            .arg(&path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to run {}", ffmpeg.display()))?;

        if !status.success() {
            bail!(
                "ffmpeg exited with {status} while splitting {}",
                src.display()
            );
        }
        outputs.push(path);
    }
    Ok(outputs)
}

/// Re-encode audio as MP3 at the given bitrate (e.g. "128k").
pub fn compress_to_mp3(src: &Path, dest: &Path, bitrate: &str) -> Result<()> {
    let ffmpeg = find_ffmpeg()?;

    let status = Command::new(&ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(src)
        .args(["-c:a", "libmp3lame", "-b:a", bitrate, "-f", "mp3"])
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to run {}", ffmpeg.display()))?;

    if !status.success() {
        bail!(
            "ffmpeg exited with {status} while compressing {}",
            src.display()
        );
    }

    tracing::info!(source = %src.display(), dest = %dest.display(), "compressed to mp3");
    Ok(())
}

/// Find the FFmpeg binary.
///
/// Search order: next to the executable, current working directory, then
/// the system PATH. Callers treat absence as a configuration error rather
/// than something to retry.
pub fn find_ffmpeg() -> Result<PathBuf> {
    let mut search_paths = Vec::new();

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            search_paths.push(exe_dir.join("ffmpeg"));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        search_paths.push(cwd.join("ffmpeg"));
    }

    for path in &search_paths {
        if path.exists() {
            tracing::debug!("found ffmpeg: {}", path.display());
            return Ok(path.clone());
        }
    }

    if let Ok(path) = which::which("ffmpeg") {
        tracing::debug!("using system ffmpeg: {}", path.display());
        return Ok(path);
    }

    bail!("ffmpeg not found next to the executable or on PATH")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, secs: u32, rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..(secs * rate) {
            writer.write_sample((i % 1000) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn native_split_respects_size_cap_and_order() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("long.wav");
        write_test_wav(&src, 10, 16000); // ~320 KB

        let max = 100_000u64; // 3-second chunks at 32 KB/s
        let chunks = split_audio(&src, dir.path(), "sess_20260101_100000", max).unwrap();

        assert_eq!(chunks.len(), 4); // 3 + 3 + 3 + 1 seconds
        for (i, chunk) in chunks.iter().enumerate() {
            let name = chunk.file_name().unwrap().to_string_lossy().into_owned();
            assert_eq!(name, format!("sess_20260101_100000_chunk_{i:03}.wav"));
            let size = std::fs::metadata(chunk).unwrap().len();
            assert!(size <= max, "chunk {i} is {size} bytes");
        }
    }

    #[test]
    fn native_split_loses_no_samples() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("short.wav");
        write_test_wav(&src, 5, 8000);

        let chunks = split_audio(&src, dir.path(), "sess_20260101_100000", 33_000).unwrap();

        let total: usize = chunks
            .iter()
            .map(|p| {
                WavReader::open(p)
                    .unwrap()
                    .samples::<i16>()
                    .count()
            })
            .sum();
        assert_eq!(total, 5 * 8000);

        // Chunk boundaries preserve sample values
        let first_chunk: Vec<i16> = WavReader::open(&chunks[0])
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(first_chunk[0], 0);
        assert_eq!(first_chunk[999], 999);
    }

    #[test]
    fn tiny_source_yields_single_chunk() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("tiny.wav");
        write_test_wav(&src, 1, 16000);

        let chunks = split_audio(&src, dir.path(), "sess_20260101_100000", 10_000_000).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn find_ffmpeg_does_not_panic() {
        let _ = find_ffmpeg();
    }
}
