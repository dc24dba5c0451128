//! Silence/speech analysis
//!
//! Windowed RMS over a finished track. A window is silent when its RMS sits
//! below the amplitude threshold, but only runs of silence at least
//! `min_silence_run_ms` long count against the useful total, so breathing
//! pauses and gaps between words stay classified as speech.

use anyhow::Result;
use deskscribe_types::SilenceReport;
use std::path::Path;

/// Analysis window size. Capture buffers arrive every few tens of
/// milliseconds; 100 ms is stable against single-buffer noise and still
/// fine enough for segment edges.
pub const WINDOW_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct SilenceParams {
    /// RMS level below which a window counts as silent. Loopback tracks are
    /// typically pre-normalized, so callers pass a lower value for them.
    pub amplitude_threshold: f32,
    /// Silent runs shorter than this stay classified as speech
    pub min_silence_run_ms: u64,
    /// Duration bound of the large-and-mostly-silent flag
    pub large_recording_secs: f64,
    /// Silence-ratio bound of the large-and-mostly-silent flag
    pub large_silence_ratio: f64,
    /// Useful-duration bound of the has-min-speech flag
    pub min_speech_secs: f64,
}

impl Default for SilenceParams {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.01,
            min_silence_run_ms: 2000,
            large_recording_secs: 600.0,
            large_silence_ratio: 0.8,
            min_speech_secs: 1.0,
        }
    }
}

impl SilenceParams {
    /// Same run/flag settings with a different amplitude threshold.
    pub fn with_threshold(&self, amplitude_threshold: f32) -> Self {
        Self {
            amplitude_threshold,
            ..self.clone()
        }
    }
}

/// Analyze mono samples and report the silence/speech split.
pub fn analyze_samples(samples: &[f32], sample_rate: u32, params: &SilenceParams) -> SilenceReport {
    let rate = sample_rate.max(1);
    let total_secs = samples.len() as f64 / rate as f64;
    let window_secs = |len: usize| len as f64 / rate as f64;

    let window_len = window_samples(rate);
    let silent = silent_windows(samples, rate, params.amplitude_threshold);
    let min_run = min_run_windows(params.min_silence_run_ms);

    let mut silence_secs = 0.0f64;
    let mut i = 0;
    while i < silent.len() {
        if !silent[i] {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < silent.len() && silent[i] {
            i += 1;
        }
        if i - run_start >= min_run {
            for w in run_start..i {
                let start = w * window_len;
                let len = window_len.min(samples.len() - start);
                silence_secs += window_secs(len);
            }
        }
    }

    let useful_secs = (total_secs - silence_secs).max(0.0);
    let silence_ratio = if total_secs > 0.0 {
        silence_secs / total_secs
    } else {
        0.0
    };

    SilenceReport {
        total_secs,
        useful_secs,
        silence_ratio,
        large_mostly_silent: total_secs > params.large_recording_secs
            && silence_ratio > params.large_silence_ratio,
        has_min_speech: useful_secs >= params.min_speech_secs,
    }
}

/// Analyze a finished audio file (any format the loader understands).
pub fn analyze_file(path: &Path, params: &SilenceParams) -> Result<SilenceReport> {
    let audio = crate::file_io::load_audio(path)?;
    Ok(analyze_samples(&audio.samples, audio.sample_rate, params))
}

/// Per-window activity mask (true = sound) at [`WINDOW_MS`] resolution.
/// Raw and unsmoothed; the attribution timeline applies its own merging.
pub fn activity_mask(samples: &[f32], sample_rate: u32, amplitude_threshold: f32) -> Vec<bool> {
    silent_windows(samples, sample_rate.max(1), amplitude_threshold)
        .into_iter()
        .map(|s| !s)
        .collect()
}

/// Remove qualifying silent runs, keeping one window of padding at each run
/// edge so cuts don't click.
pub fn strip_silence(samples: &[f32], sample_rate: u32, params: &SilenceParams) -> Vec<f32> {
    let rate = sample_rate.max(1);
    let window_len = window_samples(rate);
    let silent = silent_windows(samples, rate, params.amplitude_threshold);
    let min_run = min_run_windows(params.min_silence_run_ms);

    let mut keep = vec![true; silent.len()];
    let mut i = 0;
    while i < silent.len() {
        if !silent[i] {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < silent.len() && silent[i] {
            i += 1;
        }
        if i - run_start >= min_run {
            for w in run_start + 1..i - 1 {
                keep[w] = false;
            }
        }
    }

    let mut out = Vec::new();
    for (w, kept) in keep.iter().enumerate() {
        if *kept {
            let start = w * window_len;
            let end = (start + window_len).min(samples.len());
            out.extend_from_slice(&samples[start..end]);
        }
    }
    out
}

pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

fn window_samples(sample_rate: u32) -> usize {
    ((sample_rate as u64 * WINDOW_MS) / 1000).max(1) as usize
}

fn min_run_windows(min_silence_run_ms: u64) -> usize {
    (min_silence_run_ms / WINDOW_MS).max(1) as usize
}

fn silent_windows(samples: &[f32], sample_rate: u32, threshold: f32) -> Vec<bool> {
    samples
        .chunks(window_samples(sample_rate))
        .map(|w| rms(w) < threshold)
        .collect()
}
