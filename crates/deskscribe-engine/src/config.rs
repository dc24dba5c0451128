//! Pipeline configuration
//!
//! One JSON document (`config.json` in the platform config dir) carrying
//! every tunable the pipeline consumes: capture flags, silence thresholds,
//! chunking and retention limits, and the transcription backend selection.
//! Loading tolerates a missing or damaged file; saving is atomic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use deskscribe_audio::SilenceParams;

/// Transcription backend identifiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SttBackendKind {
    /// OpenAI audio transcription API
    #[default]
    OpenAi,
    /// Self-hosted whisper.cpp server
    WhisperServer,
}

impl std::fmt::Display for SttBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SttBackendKind::OpenAi => write!(f, "openai"),
            SttBackendKind::WhisperServer => write!(f, "whisperserver"),
        }
    }
}

/// Transcription backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    /// Which backend to use
    pub backend: SttBackendKind,
    /// Base URL override; `None` means the backend's well-known default
    pub base_url: Option<String>,
    /// API key for cloud backends
    pub api_key: Option<String>,
    /// Model name sent to the backend
    pub model: String,
    /// Language hint (ISO 639-1), auto-detect when unset
    pub language: Option<String>,
    /// Request word-level timestamps when the backend supports them
    pub word_timestamps: bool,
}

fn default_model() -> String {
    "whisper-1".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: SttBackendKind::default(),
            base_url: None,
            api_key: None,
            model: default_model(),
            language: None,
            word_timestamps: true,
        }
    }
}

/// All pipeline tunables, persisted as `config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Input device name; `None` picks the system default
    pub mic_device: Option<String>,
    /// Capture system loopback audio alongside the microphone
    pub system_audio_enabled: bool,

    /// Amplitude threshold for microphone tracks
    pub mic_amplitude_threshold: f32,
    /// Amplitude threshold for loopback tracks (pre-normalized, so lower)
    pub system_amplitude_threshold: f32,
    /// Pauses shorter than this never count as silence, in milliseconds
    pub min_silence_run_ms: u64,
    /// Recordings longer than this qualify for the mostly-silent check
    pub large_recording_secs: f64,
    /// Silence fraction above which a large recording is mostly silent
    pub large_silence_ratio: f64,
    /// Minimum useful duration for a recording to be worth transcribing
    pub min_speech_secs: f64,
    /// Write a silence-stripped copy of large mostly-silent recordings
    pub silence_removal_enabled: bool,

    /// Upper bound per uploaded chunk, in bytes
    pub max_chunk_bytes: u64,
    /// Re-encode to MP3 before upload to cut transfer size
    pub compress_before_upload: bool,
    /// MP3 bitrate used when compressing
    pub mp3_bitrate: String,

    /// How many finished recordings to retain in the manifest
    pub keep_recordings: usize,

    /// Directory for retained recordings and the manifest; `None` means the
    /// platform data dir
    pub recordings_dir: Option<PathBuf>,
    /// Directory for in-flight session files; `None` means the platform
    /// data dir
    pub work_dir: Option<PathBuf>,

    /// Transcription backend selection
    pub stt: BackendConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mic_device: None,
            system_audio_enabled: true,
            mic_amplitude_threshold: 0.01,
            system_amplitude_threshold: 0.005,
            min_silence_run_ms: 2_000,
            large_recording_secs: 600.0,
            large_silence_ratio: 0.8,
            min_speech_secs: 1.0,
            silence_removal_enabled: true,
            max_chunk_bytes: 24 * 1024 * 1024,
            compress_before_upload: false,
            mp3_bitrate: "128k".to_string(),
            keep_recordings: 20,
            recordings_dir: None,
            work_dir: None,
            stt: BackendConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config not found, using defaults");
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "failed to parse config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read config: {}", e);
                Self::default()
            }
        }
    }

    /// Save as pretty JSON via temp-file-then-rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        tracing::info!(path = %path.display(), "saved config");
        Ok(())
    }

    /// Analyzer parameters for microphone tracks.
    pub fn mic_silence_params(&self) -> SilenceParams {
        SilenceParams {
            amplitude_threshold: self.mic_amplitude_threshold,
            min_silence_run_ms: self.min_silence_run_ms,
            large_recording_secs: self.large_recording_secs,
            large_silence_ratio: self.large_silence_ratio,
            min_speech_secs: self.min_speech_secs,
        }
    }

    /// Analyzer parameters for system-loopback tracks. Loopback streams are
    /// typically pre-normalized, so the threshold sits lower than the mic's.
    pub fn system_silence_params(&self) -> SilenceParams {
        SilenceParams {
            amplitude_threshold: self.system_amplitude_threshold,
            ..self.mic_silence_params()
        }
    }

    /// Resolved recordings directory.
    pub fn recordings_dir(&self) -> PathBuf {
        self.recordings_dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("recordings"))
    }

    /// Resolved working directory for in-flight session files.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("work"))
    }
}

/// Default location of `config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskscribe")
        .join("config.json")
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskscribe")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = PipelineConfig::default();
        assert!(config.system_audio_enabled);
        assert!(config.mic_amplitude_threshold > config.system_amplitude_threshold);
        assert_eq!(config.stt.backend, SttBackendKind::OpenAi);
        assert_eq!(config.stt.model, "whisper-1");
        assert!(config.max_chunk_bytes < 25 * 1024 * 1024);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"keepRecordings": 5, "stt": {"backend": "whisperserver"}}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.keep_recordings, 5);
        assert_eq!(config.stt.backend, SttBackendKind::WhisperServer);
        // Everything not named keeps its default
        assert_eq!(config.min_silence_run_ms, 2_000);
        assert_eq!(config.stt.model, "whisper-1");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = PipelineConfig::default();
        config.keep_recordings = 7;
        config.stt.api_key = Some("sk-test".to_string());
        config.save(&path).unwrap();

        // No stray temp file left behind
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = PipelineConfig::load(&path);
        assert_eq!(loaded.keep_recordings, 7);
        assert_eq!(loaded.stt.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn missing_or_garbage_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(PipelineConfig::load(&missing).keep_recordings, 20);

        let garbage = dir.path().join("bad.json");
        std::fs::write(&garbage, "{not json").unwrap();
        assert_eq!(PipelineConfig::load(&garbage).keep_recordings, 20);
    }

    #[test]
    fn system_params_differ_only_in_threshold() {
        let config = PipelineConfig::default();
        let mic = config.mic_silence_params();
        let sys = config.system_silence_params();
        assert!(sys.amplitude_threshold < mic.amplitude_threshold);
        assert_eq!(sys.min_silence_run_ms, mic.min_silence_run_ms);
        assert_eq!(sys.large_recording_secs, mic.large_recording_secs);
    }
}
