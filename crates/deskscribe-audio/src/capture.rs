//! Microphone capture using cpal
//!
//! The device callback mixes the incoming frame to mono, quantises to i16,
//! and appends straight to the shared [`IncrementalWavWriter`]. The writer's
//! own lock is the only thing the callback ever waits on; analysis and
//! network work happen elsewhere.

use crate::wav::{IncrementalWavWriter, WavWriterError};
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use deskscribe_types::AudioDevice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Audio capture from one input device.
pub struct MicCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    stream: Option<cpal::Stream>,
    failed: Arc<AtomicBool>,
}

impl MicCapture {
    /// Open the named input device, or the default one.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            host.input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .with_context(|| format!("input device not found: {name}"))?
        } else {
            host.default_input_device()
                .context("no default input device")?
        };

        let config = device.default_input_config()?;

        tracing::info!(
            "Microphone: {} @ {}Hz, {} channels",
            device.name().unwrap_or_default(),
            config.sample_rate().0,
            config.channels()
        );

        Ok(Self {
            device,
            config: config.into(),
            stream: None,
            failed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start streaming into the writer. No-op when already started.
    pub fn start(&mut self, writer: Arc<IncrementalWavWriter>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = build_writer_stream(
            &self.device,
            &self.config,
            writer,
            self.failed.clone(),
            "microphone",
        )?;
        stream.play()?;
        self.stream = Some(stream);

        Ok(())
    }

    /// Drop the stream; the writer is left for the owner to close.
    pub fn stop(&mut self) {
        self.stream = None;
    }

    /// The device reported an unrecoverable error (unplugged, stolen).
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_default()
    }
}

/// Build an input stream that feeds the writer. Shared with the loopback
/// capture, which differs only in device selection.
pub(crate) fn build_writer_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    writer: Arc<IncrementalWavWriter>,
    failed: Arc<AtomicBool>,
    label: &'static str,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let write_failed = failed.clone();

    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = mix_to_mono_i16(data, channels);
            match writer.write_samples(&mono) {
                Ok(()) => {}
                // Force-closed from the session thread; nothing to record
                Err(WavWriterError::Closed { .. }) => {}
                Err(e) => {
                    if !write_failed.swap(true, Ordering::SeqCst) {
                        tracing::error!("{label} write failed: {e}");
                    }
                }
            }
        },
        move |err| {
            tracing::error!("{label} stream error: {err}");
            failed.store(true, Ordering::SeqCst);
        },
        None,
    )?;

    Ok(stream)
}

/// Average interleaved channels down to mono and quantise to i16.
fn mix_to_mono_i16(data: &[f32], channels: usize) -> Vec<i16> {
    data.chunks(channels.max(1))
        .map(|frame| {
            let avg = frame.iter().sum::<f32>() / frame.len() as f32;
            (avg * 32767.0).clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// List available input devices.
pub fn list_input_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices: Vec<AudioDevice> = host
        .input_devices()?
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_input_config().ok()?;

            Some(AudioDevice {
                is_default: default_name.as_ref() == Some(&name),
                name,
                channels: config.channels(),
                sample_rate: config.sample_rate().0,
            })
        })
        .collect();

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_mixdown_averages_channels() {
        // Stereo frames: (0.5, -0.5) averages to 0, (1.0, 1.0) to full scale
        let data = [0.5f32, -0.5, 1.0, 1.0];
        let mono = mix_to_mono_i16(&data, 2);
        assert_eq!(mono, vec![0, 32767]);
    }

    #[test]
    fn mixdown_clamps_out_of_range_input() {
        let data = [2.0f32, -2.0];
        let mono = mix_to_mono_i16(&data, 1);
        assert_eq!(mono, vec![32767, -32768]);
    }

    #[test]
    fn mixdown_handles_trailing_partial_frame() {
        // 3 samples at 2 channels: the last frame has one sample
        let data = [0.0f32, 0.0, 1.0];
        let mono = mix_to_mono_i16(&data, 2);
        assert_eq!(mono, vec![0, 32767]);
    }
}
