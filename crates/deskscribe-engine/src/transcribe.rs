//! Transcription orchestrator
//!
//! Drives one recording through analysis, optional splitting, per-chunk
//! transcription with retries, and source attribution. The state machine:
//!
//! `Analyzing → (Splitting?) → Transcribing[attempt] → (Retrying |
//! AttributingSource) → Done | Failed | UserCancelled`
//!
//! A chunk that exhausts its own budget becomes a failure marker in the
//! merged text; the job carries on. The job is successful only when zero
//! markers remain, and only then are the chunk files deleted. On failure
//! every intermediate file stays on disk with its absolute path logged, so
//! recovery can find it next session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use deskscribe_audio::{analyze_file, split_audio, SilenceParams};
use deskscribe_types::{ChunkReport, JobStage, SilenceReport, Transcript, TranscriptWord};

use crate::attribution::{attribute, build_activity_timeline};
use crate::error::{ErrorClass, TranscribeError};
use crate::ports::{Decision, DecisionPort, ProgressSink};
use crate::stt::{SpeechToText, TranscribeOptions};

/// Backoff before transient retry 1, 2, 3; after that the user decides.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// Sample rate the attribution timeline is built at.
const ATTRIBUTION_RATE: u32 = 16_000;

/// Everything one job needs to know about its input.
pub struct JobRequest {
    /// The finished recording to transcribe
    pub audio_path: PathBuf,
    /// Where chunk files go when splitting is needed
    pub work_dir: PathBuf,
    /// Session stem for chunk naming (`sess_<ts>`)
    pub stem: String,
    /// Analyzer parameters matching the input's source
    pub silence: SilenceParams,
    /// Hard ceiling per uploaded payload
    pub max_chunk_bytes: u64,
    /// Options forwarded to the backend
    pub stt_options: TranscribeOptions,
    /// Raw tracks for dual-source attribution, when both were captured
    pub attribution: Option<AttributionRequest>,
}

/// Raw-track inputs for the attribution stage.
pub struct AttributionRequest {
    pub mic_path: PathBuf,
    pub system_path: PathBuf,
    pub mic_threshold: f32,
    pub system_threshold: f32,
}

/// What a finished (or failed-with-partial-text) job produced.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Merged transcript, attributed when that stage ran
    pub text: String,
    /// Word timestamps shifted to whole-recording time
    pub words: Vec<TranscriptWord>,
    /// Per-chunk timing and attempt telemetry
    pub chunk_reports: Vec<ChunkReport>,
    /// Silence analysis of the input
    pub silence: Option<SilenceReport>,
    /// Source labels were applied
    pub attributed: bool,
}

/// Terminal state of one job.
#[derive(Debug)]
pub enum JobOutcome {
    /// Zero failure markers; chunk files already deleted
    Done(JobOutput),
    /// Carries the last classified error; intermediates preserved on disk
    Failed {
        error: TranscribeError,
        partial: Option<JobOutput>,
    },
    /// User cancelled between chunks; chunk files cleaned up
    Cancelled,
}

/// How one chunk ended, with the attempts it consumed.
enum ChunkResolution {
    Done(Transcript, u32),
    MarkFailed(TranscribeError, u32),
    Abort(TranscribeError, u32),
    Cancelled,
}

pub struct Orchestrator {
    backend: Arc<dyn SpeechToText>,
    decisions: Arc<dyn DecisionPort>,
    progress: Arc<dyn ProgressSink>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn SpeechToText>,
        decisions: Arc<dyn DecisionPort>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            backend,
            decisions,
            progress,
        }
    }

    /// Run one job to a terminal state. Cancellation is honoured between
    /// chunks, never mid-request.
    pub async fn run(&self, request: JobRequest, cancel: CancellationToken) -> JobOutcome {
        // --- Analyzing ---
        self.progress
            .on_stage(JobStage::Analyzing, "analyzing recording");
        let silence = match self.analyze(&request).await {
            Ok(report) => report,
            Err(e) => {
                return JobOutcome::Failed {
                    error: e,
                    partial: None,
                }
            }
        };

        let source_bytes = match tokio::fs::metadata(&request.audio_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return JobOutcome::Failed {
                    error: TranscribeError::fatal_local(format!(
                        "cannot stat {}: {}",
                        request.audio_path.display(),
                        e
                    )),
                    partial: None,
                }
            }
        };

        // --- Splitting ---
        let owns_chunks = source_bytes > request.max_chunk_bytes;
        let chunks: Vec<PathBuf> = if owns_chunks {
            self.progress.on_stage(
                JobStage::Splitting,
                "recording exceeds upload limit, splitting",
            );
            match self.split(&request).await {
                Ok(paths) => paths,
                Err(e) => {
                    return JobOutcome::Failed {
                        error: e,
                        partial: None,
                    }
                }
            }
        } else {
            vec![request.audio_path.clone()]
        };

        // --- Transcribing ---
        // On failure everything is preserved, the split source included
        let preserved: Vec<PathBuf> = if owns_chunks {
            chunks
                .iter()
                .cloned()
                .chain([request.audio_path.clone()])
                .collect()
        } else {
            chunks.clone()
        };

        let total = chunks.len();
        let mut parts: Vec<String> = Vec::with_capacity(total);
        let mut words: Vec<TranscriptWord> = Vec::new();
        let mut words_reliable = true;
        let mut reports: Vec<ChunkReport> = Vec::with_capacity(total);
        let mut last_error: Option<TranscribeError> = None;
        let mut offset_ms: i64 = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(chunk = index, total, "job cancelled between chunks");
                if owns_chunks {
                    delete_files(&chunks).await;
                }
                return JobOutcome::Cancelled;
            }

            self.progress.on_stage(
                JobStage::Transcribing,
                &format!("transcribing segment {}/{}", index + 1, total),
            );
            let started = Instant::now();

            // Chunk length keeps later word timestamps in whole-recording
            // time; only needed when there is more than one chunk.
            let chunk_ms = if total > 1 {
                let path = chunk.clone();
                match tokio::task::spawn_blocking(move || {
                    deskscribe_audio::probe_duration_secs(&path)
                })
                .await
                {
                    Ok(Ok(secs)) => Some((secs * 1000.0).round() as i64),
                    Ok(Err(e)) => {
                        tracing::warn!(chunk = index, "cannot probe chunk duration: {}", e);
                        None
                    }
                    Err(e) => {
                        tracing::warn!(chunk = index, "probe worker failed: {}", e);
                        None
                    }
                }
            } else {
                Some(0)
            };
            if chunk_ms.is_none() {
                words_reliable = false;
            }

            let bytes = match tokio::fs::read(chunk).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let error = TranscribeError::fatal_local(format!(
                        "cannot read {}: {}",
                        chunk.display(),
                        e
                    ));
                    reports.push(ChunkReport {
                        index,
                        attempts: 0,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        failed: true,
                    });
                    log_preserved(&preserved);
                    return JobOutcome::Failed {
                        error,
                        partial: partial_output(parts, reports, silence),
                    };
                }
            };
            let name = chunk
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("audio.wav")
                .to_string();

            let resolution = self
                .transcribe_chunk(index, bytes, &name, &request.stt_options)
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match resolution {
                ChunkResolution::Done(transcript, attempts) => {
                    if !transcript.words.is_empty() {
                        words.extend(transcript.words.iter().map(|w| TranscriptWord {
                            start: w.start + offset_ms,
                            end: w.end + offset_ms,
                            text: w.text.clone(),
                        }));
                    }
                    parts.push(transcript.text);
                    reports.push(ChunkReport {
                        index,
                        attempts,
                        elapsed_ms,
                        failed: false,
                    });
                }
                ChunkResolution::MarkFailed(error, attempts) => {
                    tracing::warn!(chunk = index, "segment failed, continuing: {}", error);
                    parts.push(failure_marker(index));
                    reports.push(ChunkReport {
                        index,
                        attempts,
                        elapsed_ms,
                        failed: true,
                    });
                    last_error = Some(error);
                }
                ChunkResolution::Abort(error, attempts) => {
                    tracing::error!(chunk = index, "aborting job: {}", error);
                    reports.push(ChunkReport {
                        index,
                        attempts,
                        elapsed_ms,
                        failed: true,
                    });
                    log_preserved(&preserved);
                    return JobOutcome::Failed {
                        error,
                        partial: partial_output(parts, reports, silence),
                    };
                }
                ChunkResolution::Cancelled => {
                    if owns_chunks {
                        delete_files(&chunks).await;
                    }
                    return JobOutcome::Cancelled;
                }
            }

            offset_ms += chunk_ms.unwrap_or(0);
        }

        let failed_count = reports.iter().filter(|r| r.failed).count();
        if failed_count > 0 {
            // Failure markers make the whole job a failure, so every chunk
            // file stays put for a later recovery pass.
            log_preserved(&preserved);
            let error = last_error.unwrap_or_else(|| {
                TranscribeError::permanent(format!("{} segment(s) failed", failed_count))
            });
            return JobOutcome::Failed {
                error,
                partial: partial_output(parts, reports, silence),
            };
        }

        let mut merged = Transcript {
            text: parts.join(" "),
            words: if words_reliable { words } else { Vec::new() },
            language: None,
            duration_secs: None,
        };
        if !words_reliable {
            tracing::warn!("chunk offsets unknown, dropping word timestamps");
        }

        // --- AttributingSource ---
        let mut attributed = false;
        if let Some(attribution) = &request.attribution {
            self.progress
                .on_stage(JobStage::Attributing, "labeling speakers");
            match self.attribute_sources(attribution, &merged).await {
                Ok(labeled) => {
                    attributed = labeled != merged.text;
                    merged.text = labeled;
                }
                Err(e) => {
                    tracing::warn!("attribution skipped: {}", e);
                }
            }
        }

        if owns_chunks {
            delete_files(&chunks).await;
        }

        JobOutcome::Done(JobOutput {
            text: merged.text,
            words: merged.words,
            chunk_reports: reports,
            silence: Some(silence),
            attributed,
        })
    }

    /// One chunk, start to terminal resolution: transient failures back off
    /// and retry, exhaustion and ambiguity go to the decision port.
    async fn transcribe_chunk(
        &self,
        index: usize,
        bytes: Vec<u8>,
        name: &str,
        opts: &TranscribeOptions,
    ) -> ChunkResolution {
        let mut attempts = 0u32;
        let mut retries_done = 0usize;

        loop {
            attempts += 1;
            let result = self.backend.transcribe(bytes.clone(), name, opts).await;

            let error = match result {
                Ok(t) if t.is_empty() => TranscribeError::empty_transcript(),
                Ok(t) => return ChunkResolution::Done(t, attempts),
                Err(e) => e,
            };

            match error.class {
                ErrorClass::Permanent => {
                    return ChunkResolution::MarkFailed(error, attempts);
                }
                ErrorClass::FatalLocal => {
                    return ChunkResolution::Abort(error, attempts);
                }
                ErrorClass::Transient if retries_done < RETRY_DELAYS.len() => {
                    let delay = RETRY_DELAYS[retries_done];
                    retries_done += 1;
                    self.progress.on_stage(
                        JobStage::Retrying,
                        &format!(
                            "segment {} attempt {} failed, retrying in {}s",
                            index + 1,
                            attempts,
                            delay.as_secs()
                        ),
                    );
                    tracing::info!(
                        chunk = index,
                        attempt = attempts,
                        delay_secs = delay.as_secs(),
                        "transient failure, backing off: {}",
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
                // Transient with retries spent, or an ambiguous outcome:
                // suspend until the user answers.
                _ => {
                    self.progress.on_stage(
                        JobStage::Retrying,
                        &format!("segment {} needs a decision", index + 1),
                    );
                    match self.decisions.on_chunk_stalled(index, &error).await {
                        Decision::Retry => {
                            tracing::info!(chunk = index, "user chose to retry");
                            retries_done = 0;
                        }
                        Decision::GiveUp => {
                            return ChunkResolution::MarkFailed(error, attempts);
                        }
                        Decision::CancelJob => {
                            tracing::info!(chunk = index, "user cancelled the job");
                            return ChunkResolution::Cancelled;
                        }
                    }
                }
            }
        }
    }

    async fn analyze(&self, request: &JobRequest) -> Result<SilenceReport, TranscribeError> {
        let path = request.audio_path.clone();
        let params = request.silence.clone();
        tokio::task::spawn_blocking(move || analyze_file(&path, &params))
            .await
            .map_err(|e| TranscribeError::fatal_local(format!("analysis worker failed: {}", e)))?
            .map_err(|e| TranscribeError::fatal_local(format!("analysis failed: {}", e)))
    }

    async fn split(&self, request: &JobRequest) -> Result<Vec<PathBuf>, TranscribeError> {
        let src = request.audio_path.clone();
        let dest = request.work_dir.clone();
        let stem = request.stem.clone();
        let max = request.max_chunk_bytes;

        tokio::fs::create_dir_all(&dest).await.map_err(|e| {
            TranscribeError::fatal_local(format!("cannot create {}: {}", dest.display(), e))
        })?;

        tokio::task::spawn_blocking(move || split_audio(&src, &dest, &stem, max))
            .await
            .map_err(|e| TranscribeError::fatal_local(format!("split worker failed: {}", e)))?
            .map_err(|e| {
                let message = e.to_string();
                // A missing external encoder is a setup problem, not a disk one
                if message.to_lowercase().contains("ffmpeg") {
                    TranscribeError::permanent(message)
                } else {
                    TranscribeError::fatal_local(message)
                }
            })
    }

    /// Build the activity timeline from the raw tracks and re-render the
    /// merged transcript with source labels.
    async fn attribute_sources(
        &self,
        request: &AttributionRequest,
        merged: &Transcript,
    ) -> anyhow::Result<String> {
        let mic_path = request.mic_path.clone();
        let sys_path = request.system_path.clone();
        let mic_threshold = request.mic_threshold;
        let sys_threshold = request.system_threshold;
        let transcript = merged.clone();

        tokio::task::spawn_blocking(move || {
            let mic = deskscribe_audio::file_io::load_audio_at(&mic_path, ATTRIBUTION_RATE)?;
            let sys = deskscribe_audio::file_io::load_audio_at(&sys_path, ATTRIBUTION_RATE)?;
            let timeline = build_activity_timeline(
                &mic,
                &sys,
                ATTRIBUTION_RATE,
                mic_threshold,
                sys_threshold,
            );
            Ok(attribute(&transcript, &timeline))
        })
        .await?
    }
}

fn failure_marker(index: usize) -> String {
    format!("[transcription failed: segment {}]", index + 1)
}

fn partial_output(
    parts: Vec<String>,
    reports: Vec<ChunkReport>,
    silence: SilenceReport,
) -> Option<JobOutput> {
    if parts.is_empty() {
        return None;
    }
    Some(JobOutput {
        text: parts.join(" "),
        words: Vec::new(),
        chunk_reports: reports,
        silence: Some(silence),
        attributed: false,
    })
}

async fn delete_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(file = %path.display(), "removed chunk file"),
            Err(e) => tracing::warn!(file = %path.display(), "could not remove chunk: {}", e),
        }
    }
}

/// Data-loss policy on failure: keep everything, say where it is.
fn log_preserved(paths: &[PathBuf]) {
    for path in paths {
        tracing::warn!(file = %path.display(), "preserving audio for recovery");
    }
}
