//! Deskscribe command-line interface
//!
//! Headless front end for the recording and transcription pipeline:
//! record from the console, transcribe existing files, recover interrupted
//! sessions, and inspect what has been kept.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deskscribe_engine::{default_config_path, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "deskscribe")]
#[command(author, version, about = "Desktop audio recording and transcription")]
struct Cli {
    /// Config file; defaults to the platform config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record until Enter (or a fixed duration), then transcribe
    Record {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Skip system-loopback capture for this session
        #[arg(long)]
        no_system_audio: bool,
    },
    /// Transcribe an existing audio file
    Transcribe {
        /// Audio file (wav, mp3, m4a, ogg, flac)
        file: PathBuf,
    },
    /// List interrupted sessions left in the work directory
    Recover {
        /// Transcribe every recoverable session now
        #[arg(long)]
        run: bool,
    },
    /// Show retained recordings
    List,
    /// Show available audio input devices
    Devices,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = PipelineConfig::load(&config_path);

    match cli.command {
        Commands::Record {
            duration,
            no_system_audio,
        } => {
            if no_system_audio {
                config.system_audio_enabled = false;
            }
            commands::record(config, duration).await
        }
        Commands::Transcribe { file } => commands::transcribe(config, &file).await,
        Commands::Recover { run } => commands::recover(config, run).await,
        Commands::List => commands::list(config),
        Commands::Devices => commands::devices(),
    }
}

/// Logs go to stderr and a daily-rolling file; stdout stays clean for
/// transcripts and listings. The guard must outlive the runtime so buffered
/// log lines reach the file.
fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskscribe")
        .join("logs");
    let file_appender = tracing_appender::rolling::daily(log_dir, "deskscribe.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "info,deskscribe_engine=debug,deskscribe_audio=debug".into()
            }),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_record_with_duration() {
        let cli = Cli::try_parse_from(["deskscribe", "record", "-d", "90"]).unwrap();
        match cli.command {
            Commands::Record {
                duration,
                no_system_audio,
            } => {
                assert_eq!(duration, Some(90));
                assert!(!no_system_audio);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn parse_record_without_system_audio() {
        let cli = Cli::try_parse_from(["deskscribe", "record", "--no-system-audio"]).unwrap();
        match cli.command {
            Commands::Record {
                no_system_audio, ..
            } => assert!(no_system_audio),
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn parse_transcribe_takes_a_path() {
        let cli = Cli::try_parse_from(["deskscribe", "transcribe", "/tmp/a.wav"]).unwrap();
        match cli.command {
            Commands::Transcribe { file } => {
                assert_eq!(file, PathBuf::from("/tmp/a.wav"));
            }
            _ => panic!("expected transcribe"),
        }
    }

    #[test]
    fn parse_recover_run_flag() {
        let cli = Cli::try_parse_from(["deskscribe", "recover", "--run"]).unwrap();
        assert!(matches!(cli.command, Commands::Recover { run: true }));

        let cli = Cli::try_parse_from(["deskscribe", "recover"]).unwrap();
        assert!(matches!(cli.command, Commands::Recover { run: false }));
    }

    #[test]
    fn parse_global_config_flag() {
        let cli = Cli::try_parse_from(["deskscribe", "list", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["deskscribe", "frobnicate"]).is_err());
    }

    #[test]
    fn transcribe_requires_a_file() {
        assert!(Cli::try_parse_from(["deskscribe", "transcribe"]).is_err());
    }
}
