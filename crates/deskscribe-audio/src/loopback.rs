//! System audio loopback capture
//!
//! Captures what the machine is playing, not what the microphone hears.
//! All routes go through cpal:
//! - **Windows**: WASAPI loopback, an input stream opened on the default
//!   output device
//! - **Linux**: PulseAudio/PipeWire monitor source
//! - **macOS**: a virtual loopback device (BlackHole, Loopback, Soundflower)
//!   if one is installed; Core Audio offers no direct loopback

use crate::capture::build_writer_stream;
use crate::wav::IncrementalWavWriter;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// System-audio capture from a loopback/monitor device.
pub struct LoopbackCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    stream: Option<cpal::Stream>,
    failed: Arc<AtomicBool>,
}

impl LoopbackCapture {
    /// Locate the platform's loopback route. Fails when none exists, which
    /// the session treats as "continue without system audio".
    pub fn new() -> Result<Self> {
        let (device, config) = find_loopback_device()?;

        tracing::info!(
            "System loopback: {} @ {}Hz, {} channels",
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
            "system loopback",
        )?;
        stream.play()?;
        self.stream = Some(stream);

        Ok(())
    }

    pub fn stop(&mut self) {
        self.stream = None;
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

/// True when a loopback route exists on this machine.
pub fn loopback_available() -> bool {
    find_loopback_device().is_ok()
}

#[cfg(target_os = "windows")]
fn find_loopback_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    use cpal::traits::HostTrait;

    // WASAPI delivers loopback when an input stream is opened on an output
    // device, so the default output is the capture target here.
    let host = cpal::host_from_id(cpal::HostId::Wasapi).context("WASAPI host unavailable")?;
    let device = host
        .default_output_device()
        .context("no default output device for loopback")?;
    let config = device
        .default_output_config()
        .context("no output config for loopback device")?;
    Ok((device, config))
}

#[cfg(target_os = "linux")]
fn find_loopback_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    use cpal::traits::HostTrait;

    // PulseAudio and PipeWire expose a monitor source per output device
    let host = cpal::default_host();
    let device = host
        .input_devices()?
        .find(|device| {
            device
                .name()
                .map(|name| name.contains(".monitor") || name.contains("Monitor"))
                .unwrap_or(false)
        })
        .context("no monitor source found; is PulseAudio or PipeWire running?")?;
    let config = device
        .default_input_config()
        .context("no input config for monitor source")?;
    Ok((device, config))
}

#[cfg(target_os = "macos")]
fn find_loopback_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    use cpal::traits::HostTrait;

    const VIRTUAL_DEVICE_NAMES: [&str; 3] = ["BlackHole", "Loopback", "Soundflower"];

    let host = cpal::default_host();
    let device = host
        .input_devices()?
        .find(|device| {
            device
                .name()
                .map(|name| VIRTUAL_DEVICE_NAMES.iter().any(|v| name.contains(v)))
                .unwrap_or(false)
        })
        .context("no virtual loopback device installed (BlackHole or similar)")?;
    let config = device
        .default_input_config()
        .context("no input config for virtual loopback device")?;
    Ok((device, config))
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
fn find_loopback_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    anyhow::bail!("system audio capture is not supported on this platform")
}
