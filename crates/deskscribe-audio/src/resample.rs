//! Audio resampling using rubato
//!
//! Tracks are written at each device's native rate, so anything that
//! compares or mixes them (attribution, analysis of imported files) brings
//! them to a common rate first.

use anyhow::Result;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const CHUNK_SIZE: usize = 1024;

/// Resample mono audio from `source_rate` to `target_rate`.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        2.0,
        params,
        CHUNK_SIZE,
        1,
    )?;

    let expected = (samples.len() as f64 * target_rate as f64 / source_rate as f64) as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_SIZE);

    // Feed fixed-size chunks, zero-padding the tail; trim the padding's
    // contribution off the end afterwards.
    let mut chunk = vec![0.0f32; CHUNK_SIZE];
    for block in samples.chunks(CHUNK_SIZE) {
        chunk[..block.len()].copy_from_slice(block);
        chunk[block.len()..].fill(0.0);
        let processed = resampler.process(&[chunk.clone()], None)?;
        if let Some(channel) = processed.into_iter().next() {
            output.extend(channel);
        }
    }

    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_length_follows_rate_ratio() {
        let samples: Vec<f32> = (0..48000).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample(&samples, 48000, 16000).unwrap();
        let expected = 16000;
        let diff = (out.len() as i64 - expected).unsigned_abs();
        assert!(diff < 200, "expected ~{expected}, got {}", out.len());
    }

    #[test]
    fn same_rate_is_identity() {
        let samples = vec![0.25f32; 1000];
        let out = resample(&samples, 16000, 16000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(resample(&[], 44100, 16000).unwrap().is_empty());
    }
}
