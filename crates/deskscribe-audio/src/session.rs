//! Audio capture session
//!
//! Owns the live input streams for one recording and the writers they feed.
//! cpal streams are not `Send`, so the whole session runs on a dedicated
//! thread; the public handle talks to it through atomic flags and collects
//! the outcome on `stop()`.

use crate::capture::MicCapture;
use crate::loopback::LoopbackCapture;
use crate::wav::{IncrementalWavWriter, PcmSpec};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Input device name, default device when `None`
    pub mic_device: Option<String>,
    pub capture_mic: bool,
    pub capture_system: bool,
    /// Output file for the microphone track
    pub mic_path: PathBuf,
    /// Output file for the system-loopback track
    pub system_path: PathBuf,
}

/// What one source actually produced.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub bytes: u64,
}

/// Files left behind by a finished session.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutcome {
    pub mic: Option<TrackOutcome>,
    pub system: Option<TrackOutcome>,
}

impl CaptureOutcome {
    pub fn is_dual_source(&self) -> bool {
        self.mic.is_some() && self.system.is_some()
    }

    /// Longest track duration.
    pub fn duration_secs(&self) -> f64 {
        let mic = self.mic.as_ref().map(|t| t.duration_secs).unwrap_or(0.0);
        let sys = self.system.as_ref().map(|t| t.duration_secs).unwrap_or(0.0);
        mic.max(sys)
    }
}

struct Ctrl {
    stop: AtomicBool,
    system_wanted: AtomicBool,
}

/// Handle to a running capture session. Dropping it stops the session.
pub struct CaptureSession {
    ctrl: Arc<Ctrl>,
    handle: Option<JoinHandle<CaptureOutcome>>,
}

impl CaptureSession {
    /// Start capturing. Fails only when no requested source could be
    /// started; a single dead source is logged and skipped.
    pub fn start(config: SessionConfig) -> Result<Self> {
        let ctrl = Arc::new(Ctrl {
            stop: AtomicBool::new(false),
            system_wanted: AtomicBool::new(config.capture_system),
        });

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_ctrl = ctrl.clone();
        let handle = std::thread::Builder::new()
            .name("capture-session".into())
            .spawn(move || session_thread(config, thread_ctrl, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                ctrl,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                anyhow::bail!("capture session thread exited before reporting startup")
            }
        }
    }

    /// Toggle the system-loopback source mid-session. Enabling opens a new
    /// writer starting at "now"; disabling finalizes only that writer.
    pub fn set_system_capture(&self, enabled: bool) {
        self.ctrl.system_wanted.store(enabled, Ordering::SeqCst);
    }

    pub fn system_capture(&self) -> bool {
        self.ctrl.system_wanted.load(Ordering::SeqCst)
    }

    /// Stop all streams, close all writers, return what was captured.
    pub fn stop(mut self) -> Result<CaptureOutcome> {
        self.ctrl.stop.store(true, Ordering::SeqCst);
        let handle = self
            .handle
            .take()
            .context("capture session already stopped")?;
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("capture session thread panicked"))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.ctrl.stop.store(true, Ordering::SeqCst);
            let _ = handle.join();
        }
    }
}

fn session_thread(
    config: SessionConfig,
    ctrl: Arc<Ctrl>,
    ready: mpsc::Sender<Result<()>>,
) -> CaptureOutcome {
    let mut outcome = CaptureOutcome::default();
    let mut mic: Option<(MicCapture, Arc<IncrementalWavWriter>)> = None;
    let mut system: Option<(LoopbackCapture, Arc<IncrementalWavWriter>)> = None;

    if config.capture_mic {
        match start_mic(&config) {
            Ok(pair) => mic = Some(pair),
            Err(e) => tracing::error!("microphone capture failed to start: {e:#}"),
        }
    }
    if ctrl.system_wanted.load(Ordering::SeqCst) {
        match start_system(&config) {
            Ok(pair) => system = Some(pair),
            Err(e) => {
                tracing::warn!("system capture failed to start: {e:#}");
                ctrl.system_wanted.store(false, Ordering::SeqCst);
            }
        }
    }

    if mic.is_none() && system.is_none() {
        let _ = ready.send(Err(anyhow::anyhow!(
            "no capture source could be started"
        )));
        return outcome;
    }
    let _ = ready.send(Ok(()));

    while !ctrl.stop.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);

        // A dead device closes its own writer; the session keeps going on
        // whatever is left.
        if mic.as_ref().map(|(c, _)| c.is_failed()).unwrap_or(false) {
            tracing::warn!("microphone device lost mid-session, closing its track");
            outcome.mic = finish_mic(mic.take());
        }
        if system.as_ref().map(|(c, _)| c.is_failed()).unwrap_or(false) {
            tracing::warn!("loopback device lost mid-session, closing its track");
            outcome.system = finish_system(system.take());
        }

        let want_system = ctrl.system_wanted.load(Ordering::SeqCst);
        if want_system && system.is_none() {
            if outcome.system.is_some() {
                tracing::warn!("re-enabling system capture replaces the earlier track");
            }
            match start_system(&config) {
                Ok(pair) => system = Some(pair),
                Err(e) => {
                    tracing::warn!("system capture failed to start: {e:#}");
                    ctrl.system_wanted.store(false, Ordering::SeqCst);
                }
            }
        } else if !want_system && system.is_some() {
            tracing::info!("system capture disabled mid-session");
            outcome.system = finish_system(system.take());
        }
    }

    if let Some(pair) = mic.take() {
        outcome.mic = finish_mic(Some(pair));
    }
    if let Some(pair) = system.take() {
        outcome.system = finish_system(Some(pair));
    }

    outcome
}

fn start_mic(config: &SessionConfig) -> Result<(MicCapture, Arc<IncrementalWavWriter>)> {
    let mut capture = MicCapture::new(config.mic_device.as_deref())?;
    let writer = Arc::new(IncrementalWavWriter::create(
        &config.mic_path,
        PcmSpec::mono_16(capture.sample_rate()),
    )?);
    capture.start(writer.clone())?;
    Ok((capture, writer))
}

fn start_system(config: &SessionConfig) -> Result<(LoopbackCapture, Arc<IncrementalWavWriter>)> {
    let mut capture = LoopbackCapture::new()?;
    let writer = Arc::new(IncrementalWavWriter::create(
        &config.system_path,
        PcmSpec::mono_16(capture.sample_rate()),
    )?);
    capture.start(writer.clone())?;
    Ok((capture, writer))
}

fn finish_mic(pair: Option<(MicCapture, Arc<IncrementalWavWriter>)>) -> Option<TrackOutcome> {
    let (mut capture, writer) = pair?;
    capture.stop();
    Some(close_track(writer))
}

fn finish_system(
    pair: Option<(LoopbackCapture, Arc<IncrementalWavWriter>)>,
) -> Option<TrackOutcome> {
    let (mut capture, writer) = pair?;
    capture.stop();
    Some(close_track(writer))
}

fn close_track(writer: Arc<IncrementalWavWriter>) -> TrackOutcome {
    let track = TrackOutcome {
        path: writer.path().to_path_buf(),
        sample_rate: writer.spec().sample_rate,
        duration_secs: writer.duration_secs(),
        bytes: writer.bytes_written(),
    };
    if let Err(e) = writer.close() {
        tracing::error!(path = %track.path.display(), "failed to close track writer: {e}");
    }
    track
}
