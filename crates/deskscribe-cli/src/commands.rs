//! Subcommand implementations and the console-facing ports.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use deskscribe_engine::{
    build_backend, scan, Decision, DecisionPort, ManifestStore, PipelineConfig, ProgressSink,
    Recorder, ScanOptions, SessionOutcome, TranscribeError,
};
use deskscribe_types::JobStage;

/// Prints stage changes as indented status lines.
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_stage(&self, stage: JobStage, detail: &str) {
        let label = match stage {
            JobStage::Analyzing => "analyzing",
            JobStage::Splitting => "splitting",
            JobStage::Transcribing => "transcribing",
            JobStage::Retrying => "retrying",
            JobStage::Attributing => "attributing",
            JobStage::Saving => "saving",
        };
        println!("  [{label}] {detail}");
    }
}

/// Asks on stdin what to do with a stalled chunk. Anything that is not an
/// explicit retry or cancel gives the chunk up, so an accidental Enter never
/// burns another upload.
struct ConsoleDecisions;

#[async_trait]
impl DecisionPort for ConsoleDecisions {
    async fn on_chunk_stalled(&self, chunk_index: usize, error: &TranscribeError) -> Decision {
        let prompt = format!(
            "\nSegment {} is stuck: {}\n(r)etry, (g)ive up on this segment, or (c)ancel the job? ",
            chunk_index + 1,
            error
        );
        let answer = tokio::task::spawn_blocking(move || {
            print!("{prompt}");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            line.trim().to_lowercase()
        })
        .await
        .unwrap_or_default();

        match answer.as_str() {
            "r" | "retry" => Decision::Retry,
            "c" | "cancel" => Decision::CancelJob,
            _ => Decision::GiveUp,
        }
    }
}

pub async fn record(config: PipelineConfig, duration: Option<u64>) -> Result<()> {
    let recorder = build_recorder(config)?;
    let active = recorder.start_session()?;
    println!("Recording {} ...", active.stem());

    match duration {
        Some(secs) => {
            println!("Stopping after {secs}s (Ctrl-C stops early).");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            println!("Press Enter to stop.");
            tokio::select! {
                _ = wait_for_enter() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    let cancel = CancellationToken::new();
    spawn_cancel_on_ctrl_c(cancel.clone());
    let outcome = recorder.stop_and_process(active, cancel).await?;
    report(outcome)
}

pub async fn transcribe(config: PipelineConfig, file: &Path) -> Result<()> {
    anyhow::ensure!(file.exists(), "no such file: {}", file.display());
    let recorder = build_recorder(config)?;

    let cancel = CancellationToken::new();
    spawn_cancel_on_ctrl_c(cancel.clone());
    let outcome = recorder.transcribe_file(file, cancel).await?;
    report(outcome)
}

pub async fn recover(config: PipelineConfig, run: bool) -> Result<()> {
    let work_dir = config.work_dir();
    let sessions = scan(&work_dir, &ScanOptions::default())?;
    if sessions.is_empty() {
        println!("Nothing to recover in {}.", work_dir.display());
        return Ok(());
    }

    println!(
        "{} recoverable session(s) in {}:",
        sessions.len(),
        work_dir.display()
    );
    for s in &sessions {
        println!(
            "  {}  {}  ({} file(s))",
            s.timestamp.format("%Y-%m-%d %H:%M:%S"),
            s.selected
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("?"),
            s.files.len()
        );
    }
    if !run {
        println!("\nRun `deskscribe recover --run` to transcribe them.");
        return Ok(());
    }

    let recorder = build_recorder(config)?;
    let cancel = CancellationToken::new();
    spawn_cancel_on_ctrl_c(cancel.clone());

    for s in sessions {
        if cancel.is_cancelled() {
            break;
        }
        println!("\nRecovering {} ...", s.stem);
        match recorder.transcribe_file(&s.selected, cancel.clone()).await {
            Ok(outcome) => {
                // One bad session must not block the rest
                if let Err(e) = report(outcome) {
                    eprintln!("{e}");
                }
            }
            Err(e) => eprintln!("Recovery of {} failed: {e}", s.stem),
        }
    }
    Ok(())
}

pub fn list(config: PipelineConfig) -> Result<()> {
    let store = ManifestStore::open(&config.recordings_dir())?;
    let entries = store.entries();
    if entries.is_empty() {
        println!("No recordings yet.");
        return Ok(());
    }

    println!("{} recording(s):", entries.len());
    for e in &entries {
        let local = e.recorded_at.with_timezone(&chrono::Local);
        let source = if e.dual_source { "mic+sys" } else { "mic" };
        let preview: String = e.preview.chars().take(60).collect();
        println!(
            "  {}  {:>7.1}s  {:<7}  {}",
            local.format("%Y-%m-%d %H:%M"),
            e.duration_secs,
            source,
            preview
        );
    }
    Ok(())
}

pub fn devices() -> Result<()> {
    let devices = deskscribe_audio::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }

    println!("Input devices:");
    for d in &devices {
        let marker = if d.is_default { "*" } else { " " };
        println!(
            "  {} {}  ({} ch, {} Hz)",
            marker, d.name, d.channels, d.sample_rate
        );
    }

    if deskscribe_audio::loopback_available() {
        println!("System loopback: available");
    } else {
        println!("System loopback: no route found (recordings will be mic-only)");
    }
    Ok(())
}

fn build_recorder(config: PipelineConfig) -> Result<Recorder> {
    let backend = build_backend(&config.stt);
    tracing::info!(backend = backend.name(), "transcription backend selected");
    Recorder::new(
        config,
        backend,
        Arc::new(ConsoleDecisions),
        Arc::new(ConsoleProgress),
    )
}

fn report(outcome: SessionOutcome) -> Result<()> {
    match outcome {
        SessionOutcome::Transcribed {
            entry,
            text,
            chunks,
        } => {
            println!(
                "\n--- transcript ({:.1}s, {} segment(s)) ---",
                entry.duration_secs,
                chunks.len()
            );
            println!("{text}");
            println!("--- saved as {} ---", entry.audio_file);
            Ok(())
        }
        SessionOutcome::NoSpeech { report } => {
            println!(
                "No speech detected ({:.1}s of audio, {:.1}s useful). Nothing was uploaded; \
                 the audio stays in the work directory.",
                report.total_secs, report.useful_secs
            );
            Ok(())
        }
        SessionOutcome::TranscriptionFailed { error } => {
            eprintln!("The audio is preserved; run `deskscribe recover` to retry later.");
            Err(anyhow::anyhow!("transcription failed: {}", error))
        }
        SessionOutcome::Cancelled => {
            println!("Cancelled. The captured audio stays in the work directory.");
            Ok(())
        }
    }
}

async fn wait_for_enter() {
    let _ = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    })
    .await;
}

fn spawn_cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, cancelling the job");
            cancel.cancel();
        }
    });
}
