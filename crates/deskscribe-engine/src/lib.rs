//! Deskscribe transcription engine
//!
//! Everything between a finished audio file and a saved transcript:
//! - pluggable speech-to-text backends (OpenAI, self-hosted whisper.cpp)
//! - the transcription orchestrator: splitting, retries, cancellation,
//!   user-decision escalation
//! - source attribution for dual-track recordings
//! - the recordings manifest, retention pruning, and the crash-recovery
//!   scanner
//!
//! The [`recorder`] module is the front door: it drives a capture session
//! through the whole pipeline and persists the result.

pub mod attribution;
pub mod config;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod ports;
pub mod recorder;
pub mod recovery;
pub mod stt;
pub mod transcribe;

pub use config::{default_config_path, BackendConfig, PipelineConfig, SttBackendKind};
pub use error::{ErrorClass, TranscribeError};
pub use manifest::ManifestStore;
pub use ports::{Decision, DecisionPort, NullProgress, ProgressSink};
pub use recorder::{ActiveRecording, Recorder, SessionOutcome};
pub use recovery::{scan, RecoverableSession, ScanOptions};
pub use stt::{build_backend, SpeechToText, TranscribeOptions};
pub use transcribe::{JobOutcome, JobOutput, JobRequest, Orchestrator};
