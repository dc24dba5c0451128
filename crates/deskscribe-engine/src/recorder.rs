//! End-to-end recording flow: capture, analyze, process, transcribe, persist.
//!
//! One `Recorder` wires the configuration, the manifest store, and the
//! transcription orchestrator together. The capture side is a two-step
//! handshake (`start_session` / `stop_and_process`) so a caller can hold the
//! session open for as long as the user wants; `transcribe_file` runs the
//! same back half over an existing file, which is how recovered sessions get
//! finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use tokio_util::sync::CancellationToken;

use deskscribe_audio::file_io::{load_audio, write_wav_i16};
use deskscribe_audio::{
    analyze_file, compress_to_mp3, strip_silence, CaptureSession, SessionConfig, SilenceParams,
};
use deskscribe_types::{ChunkReport, JobStage, RecordingEntry, SilenceReport};

use crate::config::PipelineConfig;
use crate::error::TranscribeError;
use crate::manifest::ManifestStore;
use crate::naming::{self, SessionFileKind};
use crate::ports::{DecisionPort, ProgressSink};
use crate::stt::{SpeechToText, TranscribeOptions};
use crate::transcribe::{AttributionRequest, JobOutcome, JobOutput, JobRequest, Orchestrator};

/// A capture session in progress.
pub struct ActiveRecording {
    session: CaptureSession,
    stem: String,
    started: DateTime<Local>,
}

impl ActiveRecording {
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Toggle system-loopback capture mid-session.
    pub fn set_system_capture(&self, enabled: bool) {
        self.session.set_system_capture(enabled);
    }

    pub fn system_capture(&self) -> bool {
        self.session.system_capture()
    }
}

/// How one recording session (or one re-transcription) ended.
pub enum SessionOutcome {
    /// Transcript written, recording persisted in the manifest
    Transcribed {
        entry: RecordingEntry,
        text: String,
        chunks: Vec<ChunkReport>,
    },
    /// Too little speech to be worth an upload; audio left in the work dir
    NoSpeech { report: SilenceReport },
    /// The job failed; every session file is preserved for recovery
    TranscriptionFailed { error: TranscribeError },
    /// User cancelled mid-job; captured audio kept, temp files removed
    Cancelled,
}

/// One audio file headed for the manifest, plus the intermediates that die
/// with a successful transcription.
struct SessionArtifacts {
    stem: String,
    recorded_at: DateTime<Utc>,
    keep: PathBuf,
    discard: Vec<PathBuf>,
    duration_secs: f64,
    dual_source: bool,
}

pub struct Recorder {
    config: PipelineConfig,
    orchestrator: Orchestrator,
    progress: Arc<dyn ProgressSink>,
    store: ManifestStore,
}

impl Recorder {
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn SpeechToText>,
        decisions: Arc<dyn DecisionPort>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        let store = ManifestStore::open(&config.recordings_dir())?;
        if let Err(e) = store.reconcile() {
            tracing::warn!("manifest reconcile failed: {}", e);
        }
        let orchestrator = Orchestrator::new(backend, decisions, progress.clone());
        Ok(Self {
            config,
            orchestrator,
            progress,
            store,
        })
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open the capture writers and start streaming.
    pub fn start_session(&self) -> Result<ActiveRecording> {
        let work_dir = self.config.work_dir();
        std::fs::create_dir_all(&work_dir)
            .with_context(|| format!("failed to create {}", work_dir.display()))?;

        let started = Local::now();
        let stem = naming::session_stem(&started);
        let session = CaptureSession::start(SessionConfig {
            mic_device: self.config.mic_device.clone(),
            capture_mic: true,
            capture_system: self.config.system_audio_enabled,
            mic_path: naming::session_file(&work_dir, &stem, SessionFileKind::Raw),
            system_path: naming::session_file(&work_dir, &stem, SessionFileKind::RawSys),
        })?;
        tracing::info!(stem = %stem, "recording started");

        Ok(ActiveRecording {
            session,
            stem,
            started,
        })
    }

    /// Stop the capture and drive the recording through the whole pipeline.
    pub async fn stop_and_process(
        &self,
        active: ActiveRecording,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome> {
        let ActiveRecording {
            session,
            stem,
            started,
        } = active;
        let outcome = session.stop()?;
        let duration_secs = outcome.duration_secs();
        tracing::info!(
            stem = %stem,
            duration_secs = format!("{:.1}", duration_secs),
            dual_source = outcome.is_dual_source(),
            "recording stopped"
        );

        let Some(primary) = outcome.mic.as_ref().or(outcome.system.as_ref()) else {
            anyhow::bail!("capture session produced no audio");
        };
        let primary_is_mic = outcome.mic.is_some();
        let params = if primary_is_mic {
            self.config.mic_silence_params()
        } else {
            self.config.system_silence_params()
        };

        let report = self.analyze(&primary.path, &params).await?;
        if !report.has_min_speech {
            tracing::warn!(
                stem = %stem,
                useful_secs = format!("{:.1}", report.useful_secs),
                "recording has almost no speech, not transcribing"
            );
            return Ok(SessionOutcome::NoSpeech { report });
        }

        let work_dir = self.config.work_dir();
        let mut processed: Option<PathBuf> = None;
        if self.config.silence_removal_enabled && report.large_mostly_silent {
            match self
                .write_stripped(&primary.path, &work_dir, &stem, &params)
                .await
            {
                Ok(path) => processed = Some(path),
                Err(e) => tracing::warn!("silence removal failed, using raw audio: {}", e),
            }
        }

        let upload_base = processed.clone().unwrap_or_else(|| primary.path.clone());
        let compressed = if self.config.compress_before_upload {
            self.compress(&upload_base, &work_dir, &stem).await
        } else {
            None
        };
        let upload = compressed.clone().unwrap_or_else(|| upload_base.clone());

        let attribution = match (&outcome.mic, &outcome.system) {
            (Some(mic), Some(sys)) => Some(AttributionRequest {
                mic_path: mic.path.clone(),
                system_path: sys.path.clone(),
                mic_threshold: self.config.mic_amplitude_threshold,
                system_threshold: self.config.system_amplitude_threshold,
            }),
            _ => None,
        };

        let request = JobRequest {
            audio_path: upload.clone(),
            work_dir: work_dir.clone(),
            stem: stem.clone(),
            silence: params,
            max_chunk_bytes: self.config.max_chunk_bytes,
            stt_options: self.stt_options(),
            attribution,
        };

        match self.orchestrator.run(request, cancel).await {
            JobOutcome::Done(output) => {
                let mut discard: Vec<PathBuf> = Vec::new();
                if let Some(c) = &compressed {
                    discard.push(c.clone());
                }
                if processed.is_some() {
                    discard.push(primary.path.clone());
                }
                if primary_is_mic {
                    if let Some(sys) = &outcome.system {
                        discard.push(sys.path.clone());
                    }
                }
                let artifacts = SessionArtifacts {
                    stem,
                    recorded_at: started.with_timezone(&Utc),
                    keep: processed.unwrap_or_else(|| primary.path.clone()),
                    discard,
                    duration_secs,
                    dual_source: outcome.is_dual_source(),
                };
                let (entry, text, chunks) = self.finalize_success(artifacts, output).await?;
                Ok(SessionOutcome::Transcribed {
                    entry,
                    text,
                    chunks,
                })
            }
            JobOutcome::Failed { error, .. } => {
                let mut also_preserved: Vec<PathBuf> = Vec::new();
                if let Some(mic) = &outcome.mic {
                    also_preserved.push(mic.path.clone());
                }
                if let Some(sys) = &outcome.system {
                    also_preserved.push(sys.path.clone());
                }
                if let Some(p) = &processed {
                    also_preserved.push(p.clone());
                }
                if let Some(c) = &compressed {
                    also_preserved.push(c.clone());
                }
                for path in also_preserved.iter().filter(|p| **p != upload) {
                    tracing::warn!(file = %path.display(), "preserving audio for recovery");
                }
                Ok(SessionOutcome::TranscriptionFailed { error })
            }
            JobOutcome::Cancelled => {
                if let Some(c) = &compressed {
                    remove_quietly(c).await;
                }
                tracing::info!(stem = %stem, "transcription cancelled, audio kept");
                Ok(SessionOutcome::Cancelled)
            }
        }
    }

    /// Run the transcription half of the pipeline over an existing file,
    /// typically one offered by the recovery scanner.
    pub async fn transcribe_file(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("audio path has no file name")?;
        let parsed = naming::parse_session_file(file_name);

        let stem = match &parsed {
            Some(p) => p.stem.clone(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("recording")
                .to_string(),
        };
        let recorded_at = parsed
            .as_ref()
            .and_then(|p| p.timestamp.and_local_timezone(Local).earliest())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let is_loopback_track = matches!(
            parsed.as_ref().map(|p| p.kind),
            Some(SessionFileKind::RawSys)
        );
        let params = if is_loopback_track {
            self.config.system_silence_params()
        } else {
            self.config.mic_silence_params()
        };

        let report = self.analyze(path, &params).await?;
        if !report.has_min_speech {
            tracing::warn!(
                file = %path.display(),
                useful_secs = format!("{:.1}", report.useful_secs),
                "file has almost no speech, not transcribing"
            );
            return Ok(SessionOutcome::NoSpeech { report });
        }

        // A mic raw with a loopback sibling can still be attributed
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let attribution = match parsed.as_ref().map(|p| p.kind) {
            Some(SessionFileKind::Raw) => {
                let sys = naming::session_file(&dir, &stem, SessionFileKind::RawSys);
                sys.exists().then(|| AttributionRequest {
                    mic_path: path.to_path_buf(),
                    system_path: sys,
                    mic_threshold: self.config.mic_amplitude_threshold,
                    system_threshold: self.config.system_amplitude_threshold,
                })
            }
            _ => None,
        };
        let dual_source = attribution.is_some();

        let request = JobRequest {
            audio_path: path.to_path_buf(),
            work_dir: dir.clone(),
            stem: stem.clone(),
            silence: params,
            max_chunk_bytes: self.config.max_chunk_bytes,
            stt_options: self.stt_options(),
            attribution,
        };

        match self.orchestrator.run(request, cancel).await {
            JobOutcome::Done(output) => {
                let duration_secs = report.total_secs;
                let discard = session_siblings(&dir, &stem, path);
                let artifacts = SessionArtifacts {
                    stem,
                    recorded_at,
                    keep: path.to_path_buf(),
                    discard,
                    duration_secs,
                    dual_source,
                };
                let (entry, text, chunks) = self.finalize_success(artifacts, output).await?;
                Ok(SessionOutcome::Transcribed {
                    entry,
                    text,
                    chunks,
                })
            }
            JobOutcome::Failed { error, .. } => Ok(SessionOutcome::TranscriptionFailed { error }),
            JobOutcome::Cancelled => Ok(SessionOutcome::Cancelled),
        }
    }

    /// Move the kept audio into the recordings directory, write the
    /// transcript, record the manifest entry, prune, drop intermediates.
    async fn finalize_success(
        &self,
        artifacts: SessionArtifacts,
        output: JobOutput,
    ) -> Result<(RecordingEntry, String, Vec<ChunkReport>)> {
        self.progress
            .on_stage(JobStage::Saving, "saving recording");

        let recordings_dir = self.config.recordings_dir();
        tokio::fs::create_dir_all(&recordings_dir)
            .await
            .with_context(|| format!("failed to create {}", recordings_dir.display()))?;

        let transcript_name = format!("{}.txt", artifacts.stem);
        tokio::fs::write(recordings_dir.join(&transcript_name), &output.text)
            .await
            .with_context(|| format!("failed to write {}", transcript_name))?;

        let audio_name = artifacts
            .keep
            .file_name()
            .and_then(|n| n.to_str())
            .context("kept audio has no file name")?
            .to_string();
        let dest = recordings_dir.join(&audio_name);
        move_file(&artifacts.keep, &dest).await?;

        let size_bytes = tokio::fs::metadata(&dest)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let duration_secs = {
            // The kept file may be shorter than the capture after silence
            // removal, so measure it rather than trust the session clock
            let probe = dest.clone();
            tokio::task::spawn_blocking(move || deskscribe_audio::probe_duration_secs(&probe))
                .await
                .map(|r| r.unwrap_or(artifacts.duration_secs))
                .unwrap_or(artifacts.duration_secs)
        };

        for path in artifacts.discard.iter().filter(|p| **p != artifacts.keep) {
            remove_quietly(path).await;
        }

        let entry = RecordingEntry {
            id: uuid::Uuid::new_v4().to_string(),
            audio_file: audio_name,
            recorded_at: artifacts.recorded_at,
            duration_secs,
            size_bytes,
            preview: preview_of(&output.text),
            transcript_file: Some(transcript_name),
            dual_source: artifacts.dual_source,
        };
        self.store.add_recording(entry.clone())?;
        tracing::info!(
            id = %entry.id,
            file = %entry.audio_file,
            "recording saved"
        );

        let pruned = self.store.prune_to_count(self.config.keep_recordings)?;
        for old in &pruned {
            remove_quietly(&self.store.audio_path(old)).await;
            if let Some(t) = &old.transcript_file {
                remove_quietly(&recordings_dir.join(t)).await;
            }
            tracing::info!(id = %old.id, "pruned old recording");
        }

        Ok((entry, output.text, output.chunk_reports))
    }

    async fn analyze(&self, path: &Path, params: &SilenceParams) -> Result<SilenceReport> {
        let path = path.to_path_buf();
        let params = params.clone();
        tokio::task::spawn_blocking(move || analyze_file(&path, &params)).await?
    }

    async fn write_stripped(
        &self,
        src: &Path,
        work_dir: &Path,
        stem: &str,
        params: &SilenceParams,
    ) -> Result<PathBuf> {
        let dest = naming::session_file(work_dir, stem, SessionFileKind::Processed);
        let src = src.to_path_buf();
        let dest_for_task = dest.clone();
        let params = params.clone();

        let kept_secs = tokio::task::spawn_blocking(move || -> Result<f64> {
            let audio = load_audio(&src)?;
            let kept = strip_silence(&audio.samples, audio.sample_rate, &params);
            let kept_secs = kept.len() as f64 / audio.sample_rate.max(1) as f64;
            write_wav_i16(&dest_for_task, &kept, audio.sample_rate)?;
            Ok(kept_secs)
        })
        .await??;

        tracing::info!(
            file = %dest.display(),
            kept_secs = format!("{:.1}", kept_secs),
            "wrote silence-stripped copy"
        );
        Ok(dest)
    }

    /// Best effort: a failed compression falls back to the uncompressed file.
    async fn compress(&self, src: &Path, work_dir: &Path, stem: &str) -> Option<PathBuf> {
        let dest = naming::session_file(work_dir, stem, SessionFileKind::Compressed);
        let src = src.to_path_buf();
        let dest_for_task = dest.clone();
        let bitrate = self.config.mp3_bitrate.clone();

        let result = tokio::task::spawn_blocking(move || {
            compress_to_mp3(&src, &dest_for_task, &bitrate)
        })
        .await;
        match result {
            Ok(Ok(())) => {
                tracing::info!(file = %dest.display(), "compressed for upload");
                Some(dest)
            }
            Ok(Err(e)) => {
                tracing::warn!("upload compression skipped: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("compression worker failed: {}", e);
                None
            }
        }
    }

    fn stt_options(&self) -> TranscribeOptions {
        TranscribeOptions {
            language: self.config.stt.language.clone(),
            word_timestamps: self.config.stt.word_timestamps,
        }
    }
}

/// Other files of the same session, deleted once it transcribes successfully.
fn session_siblings(dir: &Path, stem: &str, keep: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            if path == keep {
                return None;
            }
            let name = path.file_name()?.to_str()?;
            (naming::parse_session_file(name)?.stem == stem).then_some(path)
        })
        .collect()
}

fn preview_of(text: &str) -> String {
    text.chars().take(160).collect()
}

async fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if src == dest {
        return Ok(());
    }
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems
    tokio::fs::copy(src, dest)
        .await
        .with_context(|| format!("failed to copy {}", src.display()))?;
    tokio::fs::remove_file(src)
        .await
        .with_context(|| format!("failed to remove {}", src.display()))?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(file = %path.display(), "could not remove: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    use crate::config::SttBackendKind;
    use crate::ports::{AlwaysGiveUp, NullProgress};
    use deskscribe_types::{Transcript, TranscriptWord};

    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<Transcript, TranscribeError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<Transcript, TranscribeError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl SpeechToText for ScriptedBackend {
        fn id(&self) -> SttBackendKind {
            SttBackendKind::OpenAi
        }

        fn name(&self) -> &str {
            "scripted"
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _file_name: &str,
            _opts: &TranscribeOptions,
        ) -> Result<Transcript, TranscribeError> {
            *self.calls.lock() += 1;
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Transcript::plain("ok")))
        }
    }

    fn test_config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            recordings_dir: Some(root.join("recordings")),
            work_dir: Some(root.join("work")),
            ..PipelineConfig::default()
        }
    }

    fn recorder(config: PipelineConfig, backend: Arc<ScriptedBackend>) -> Recorder {
        Recorder::new(config, backend, Arc::new(AlwaysGiveUp), Arc::new(NullProgress)).unwrap()
    }

    fn write_tone(path: &Path, secs: usize) {
        let samples: Vec<f32> = (0..secs * 16_000)
            .map(|i| if (i / 80) % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        write_wav_i16(path, &samples, 16_000).unwrap();
    }

    #[tokio::test]
    async fn transcribe_file_moves_audio_and_records_it() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let work = config.work_dir();
        std::fs::create_dir_all(&work).unwrap();
        let raw = work.join("sess_20260101_100000_raw.wav");
        write_tone(&raw, 2);

        let backend = ScriptedBackend::new(vec![Ok(Transcript::plain("hello from the past"))]);
        let rec = recorder(config.clone(), backend);

        let outcome = rec
            .transcribe_file(&raw, CancellationToken::new())
            .await
            .unwrap();
        let SessionOutcome::Transcribed { entry, text, .. } = outcome else {
            panic!("expected a transcribed session");
        };

        assert_eq!(text, "hello from the past");
        assert_eq!(entry.audio_file, "sess_20260101_100000_raw.wav");
        assert_eq!(
            entry.transcript_file.as_deref(),
            Some("sess_20260101_100000.txt")
        );
        assert!(entry.preview.starts_with("hello"));
        assert!(entry.duration_secs > 1.5);
        assert!(!entry.dual_source);

        // Audio moved out of the work dir, transcript written next to it
        let recs = config.recordings_dir();
        assert!(!raw.exists());
        assert!(recs.join("sess_20260101_100000_raw.wav").exists());
        let saved = std::fs::read_to_string(recs.join("sess_20260101_100000.txt")).unwrap();
        assert_eq!(saved, "hello from the past");
        assert_eq!(rec.store().len(), 1);
    }

    #[tokio::test]
    async fn failed_transcription_leaves_the_work_dir_alone() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let work = config.work_dir();
        std::fs::create_dir_all(&work).unwrap();
        let raw = work.join("sess_20260101_100000_raw.wav");
        write_tone(&raw, 2);

        let backend =
            ScriptedBackend::new(vec![Err(TranscribeError::permanent("bad credentials"))]);
        let rec = recorder(config.clone(), backend);

        let outcome = rec
            .transcribe_file(&raw, CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::TranscriptionFailed { .. }
        ));
        assert!(raw.exists(), "failed jobs must not delete audio");
        assert_eq!(rec.store().len(), 0);
        assert!(!config.recordings_dir().join("sess_20260101_100000.txt").exists());
    }

    #[tokio::test]
    async fn silent_file_is_flagged_not_uploaded() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let work = config.work_dir();
        std::fs::create_dir_all(&work).unwrap();
        let raw = work.join("sess_20260101_100000_raw.wav");
        write_wav_i16(&raw, &vec![0.0f32; 2 * 16_000], 16_000).unwrap();

        let backend = ScriptedBackend::new(vec![]);
        let rec = recorder(config, backend.clone());

        let outcome = rec
            .transcribe_file(&raw, CancellationToken::new())
            .await
            .unwrap();
        let SessionOutcome::NoSpeech { report } = outcome else {
            panic!("expected the no-speech gate");
        };
        assert!(!report.has_min_speech);
        assert_eq!(*backend.calls.lock(), 0);
        assert!(raw.exists());
    }

    #[tokio::test]
    async fn dual_source_recovery_attributes_and_drops_the_loopback_track() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let work = config.work_dir();
        std::fs::create_dir_all(&work).unwrap();

        // Mic first second, system audio the next
        let mut mic = vec![0.4f32; 16_000];
        mic.extend(vec![0.0f32; 16_000]);
        let mut sys = vec![0.0f32; 16_000];
        sys.extend(vec![0.4f32; 16_000]);
        let raw = work.join("sess_20260101_100000_raw.wav");
        let raw_sys = work.join("sess_20260101_100000_raw_sys.wav");
        write_wav_i16(&raw, &mic, 16_000).unwrap();
        write_wav_i16(&raw_sys, &sys, 16_000).unwrap();

        let backend = ScriptedBackend::new(vec![Ok(Transcript {
            text: "hi there".to_string(),
            words: vec![
                TranscriptWord {
                    start: 200,
                    end: 400,
                    text: "hi".to_string(),
                },
                TranscriptWord {
                    start: 1_500,
                    end: 1_700,
                    text: "there".to_string(),
                },
            ],
            language: None,
            duration_secs: None,
        })]);
        let rec = recorder(config.clone(), backend);

        let outcome = rec
            .transcribe_file(&raw, CancellationToken::new())
            .await
            .unwrap();
        let SessionOutcome::Transcribed { entry, text, .. } = outcome else {
            panic!("expected a transcribed session");
        };
        assert_eq!(text, "[You] hi [System] there");
        assert!(entry.dual_source);
        // The loopback track was an intermediate of this session
        assert!(!raw_sys.exists());
        assert!(config
            .recordings_dir()
            .join("sess_20260101_100000_raw.wav")
            .exists());
    }

    #[tokio::test]
    async fn retention_prunes_the_oldest_recording_and_its_files() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.keep_recordings = 1;
        let work = config.work_dir();
        std::fs::create_dir_all(&work).unwrap();

        let first = work.join("sess_20260101_100000_raw.wav");
        let second = work.join("sess_20260101_110000_raw.wav");
        write_tone(&first, 2);
        write_tone(&second, 2);

        let backend = ScriptedBackend::new(vec![
            Ok(Transcript::plain("first")),
            Ok(Transcript::plain("second")),
        ]);
        let rec = recorder(config.clone(), backend);

        rec.transcribe_file(&first, CancellationToken::new())
            .await
            .unwrap();
        rec.transcribe_file(&second, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rec.store().len(), 1);
        let kept = rec.store().entries();
        assert_eq!(kept[0].audio_file, "sess_20260101_110000_raw.wav");

        let recs = config.recordings_dir();
        assert!(!recs.join("sess_20260101_100000_raw.wav").exists());
        assert!(!recs.join("sess_20260101_100000.txt").exists());
        assert!(recs.join("sess_20260101_110000_raw.wav").exists());
    }

    #[tokio::test]
    async fn cancelled_job_keeps_the_audio() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let work = config.work_dir();
        std::fs::create_dir_all(&work).unwrap();
        let raw = work.join("sess_20260101_100000_raw.wav");
        write_tone(&raw, 2);

        let backend = ScriptedBackend::new(vec![]);
        let rec = recorder(config, backend);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = rec.transcribe_file(&raw, cancel).await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert!(raw.exists());
        assert_eq!(rec.store().len(), 0);
    }
}
