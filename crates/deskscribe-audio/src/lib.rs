//! Audio layer for Deskscribe
//!
//! Everything that touches sound or sound files lives here:
//! - **Incremental WAV writing** that keeps the file playable after every
//!   buffer, so a crash never leaves an unreadable recording
//! - **Microphone capture** via cpal (cross-platform)
//! - **System audio capture** through loopback/monitor devices:
//!   - Windows: WASAPI loopback of the default output
//!   - Linux: PulseAudio/PipeWire monitor source
//!   - macOS: virtual loopback device (BlackHole and friends)
//! - **Silence/speech analysis** over finished recordings
//! - **Large-file splitting**, native for WAV, via FFmpeg otherwise

pub mod analysis;
pub mod capture;
pub mod file_io;
pub mod loopback;
pub mod resample;
pub mod session;
pub mod split;
pub mod wav;

pub use analysis::{activity_mask, analyze_file, analyze_samples, strip_silence, SilenceParams};
pub use capture::{list_input_devices, MicCapture};
pub use file_io::{load_audio, probe_duration_secs, LoadedAudio};
pub use loopback::{loopback_available, LoopbackCapture};
pub use session::{CaptureOutcome, CaptureSession, SessionConfig, TrackOutcome};
pub use split::{compress_to_mp3, find_ffmpeg, split_audio};
pub use wav::{IncrementalWavWriter, PcmSpec, WavWriterError};
