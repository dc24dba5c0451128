//! Audio file I/O
//!
//! Loads finished recordings back into memory for analysis, attribution,
//! and manifest repair. WAV goes through hound; everything else through
//! symphonia. Samples always come back mono at the file's native rate.

use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;

/// Mono samples plus the rate they were decoded at.
pub struct LoadedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl LoadedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Load an audio file as mono f32 at its native sample rate.
pub fn load_audio(path: &Path) -> Result<LoadedAudio> {
    match extension_of(path).as_str() {
        "wav" => load_wav(path),
        "mp3" | "m4a" | "ogg" | "flac" => load_with_symphonia(path),
        ext => anyhow::bail!("unsupported audio format: {ext}"),
    }
}

/// Load and bring to a common rate, for callers that compare tracks
/// recorded at different device rates.
pub fn load_audio_at(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let audio = load_audio(path)?;
    if audio.sample_rate == target_rate {
        return Ok(audio.samples);
    }
    crate::resample::resample(&audio.samples, audio.sample_rate, target_rate)
}

/// Duration without decoding when the container declares it.
pub fn probe_duration_secs(path: &Path) -> Result<f64> {
    if extension_of(path) == "wav" {
        let reader = WavReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let spec = reader.spec();
        return Ok(reader.duration() as f64 / spec.sample_rate.max(1) as f64);
    }

    // Compressed formats: trust declared frame counts, decode as a last
    // resort.
    if let Some(secs) = declared_duration_secs(path)? {
        return Ok(secs);
    }
    Ok(load_audio(path)?.duration_secs())
}

/// Write mono f32 samples as 16-bit PCM WAV.
pub fn write_wav_i16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &sample in samples {
        let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(sample_i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn load_wav(path: &Path) -> Result<LoadedAudio> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open WAV {}", path.display()))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
    };

    Ok(LoadedAudio {
        samples: mix_to_mono(samples, channels),
        sample_rate,
    })
}

fn load_with_symphonia(path: &Path) -> Result<LoadedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let hint = Hint::new();
    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();
    let decoder_opts = DecoderOptions::default();

    let probed =
        symphonia::default::get_probe().format(&hint, mss, &format_opts, &metadata_opts)?;

    let mut format = probed.format;
    let track = format.default_track().context("no audio track found")?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .context("unknown sample rate")?;
    let channels = track
        .codec_params
        .channels
        .context("unknown channel count")?
        .count();

    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &decoder_opts)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    Ok(LoadedAudio {
        samples: mix_to_mono(samples, channels),
        sample_rate,
    })
}

fn declared_duration_secs(path: &Path) -> Result<Option<f64>> {
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let Some(track) = probed.format.default_track() else {
        return Ok(None);
    };
    let params = &track.codec_params;
    match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Ok(Some(frames as f64 / rate as f64)),
        _ => Ok(None),
    }
}

fn mix_to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}
