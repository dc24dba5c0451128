//! Transcription backends
//!
//! One trait, one implementation per backend, selected by configuration.
//! The orchestrator only ever sees `Arc<dyn SpeechToText>`.

use std::sync::Arc;

use async_trait::async_trait;

use deskscribe_types::Transcript;

use crate::config::{BackendConfig, SttBackendKind};
use crate::error::TranscribeError;

pub mod openai;
pub mod whisper_server;

pub use openai::OpenAiTranscriber;
pub use whisper_server::WhisperServerTranscriber;

/// Per-request knobs passed down from configuration.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Language hint (ISO 639-1), auto-detect when unset
    pub language: Option<String>,
    /// Ask for word-level timestamps where the backend supports them
    pub word_timestamps: bool,
}

/// Capability interface over remote transcription backends.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn id(&self) -> SttBackendKind;

    fn name(&self) -> &str;

    /// Transcribe one complete audio file held in memory. `file_name` is the
    /// payload's original name, used for content-type negotiation.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        opts: &TranscribeOptions,
    ) -> Result<Transcript, TranscribeError>;
}

/// Build the backend the configuration selects.
pub fn build_backend(config: &BackendConfig) -> Arc<dyn SpeechToText> {
    match config.backend {
        SttBackendKind::OpenAi => Arc::new(OpenAiTranscriber::new(config)),
        SttBackendKind::WhisperServer => Arc::new(WhisperServerTranscriber::new(config)),
    }
}

/// Map an HTTP error status to the retry taxonomy. Auth failures and client
/// errors are permanent; throttling, request timeouts, and anything
/// server-side is worth retrying.
pub(crate) fn classify_http_status(status: u16, body: &str) -> TranscribeError {
    let detail = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };
    match status {
        401 | 403 => TranscribeError::auth_error(),
        408 => TranscribeError::timeout(),
        429 => TranscribeError::rate_limited(),
        400..=499 => TranscribeError::permanent(detail),
        _ => TranscribeError::transient(detail),
    }
}

/// Map a reqwest transport failure to the retry taxonomy. Everything here
/// happened before we saw a status line, so it is always worth retrying.
pub(crate) fn classify_transport_error(e: reqwest::Error) -> TranscribeError {
    if e.is_timeout() {
        TranscribeError::timeout()
    } else if e.is_connect() {
        TranscribeError::transient(format!("connection failed: {}", e))
    } else {
        TranscribeError::transient(e.to_string())
    }
}

pub(crate) fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "audio/wav",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn auth_statuses_are_permanent() {
        assert_eq!(classify_http_status(401, "").class, ErrorClass::Permanent);
        assert_eq!(classify_http_status(403, "").class, ErrorClass::Permanent);
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 404, 413, 415] {
            let e = classify_http_status(status, "bad request");
            assert_eq!(e.class, ErrorClass::Permanent, "HTTP {}", status);
            assert!(e.message.contains("bad request"));
        }
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        for status in [408, 429, 500, 502, 503] {
            assert_eq!(
                classify_http_status(status, "").class,
                ErrorClass::Transient,
                "HTTP {}",
                status
            );
        }
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for("sess_20260101_100000_chunk_000.wav"), "audio/wav");
        assert_eq!(mime_for("sess_20260101_100000_compressed.mp3"), "audio/mpeg");
        assert_eq!(mime_for("noext"), "audio/wav");
    }

    #[test]
    fn build_backend_honours_selection() {
        let mut config = BackendConfig::default();
        assert_eq!(build_backend(&config).id(), SttBackendKind::OpenAi);
        config.backend = SttBackendKind::WhisperServer;
        assert_eq!(build_backend(&config).id(), SttBackendKind::WhisperServer);
    }
}
