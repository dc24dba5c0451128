//! Self-hosted whisper server backend
//!
//! Talks to a whisper.cpp `server` instance (or anything speaking the same
//! `/inference` protocol) on the local network. No auth, no word-level
//! timestamps; attribution downstream falls back to its proportional path.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use deskscribe_types::Transcript;

use crate::config::{BackendConfig, SttBackendKind};
use crate::error::TranscribeError;
use crate::stt::{
    classify_http_status, classify_transport_error, mime_for, SpeechToText, TranscribeOptions,
};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    text: String,
}

pub struct WhisperServerTranscriber {
    base_url: String,
    client: reqwest::Client,
}

impl WhisperServerTranscriber {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperServerTranscriber {
    fn id(&self) -> SttBackendKind {
        SttBackendKind::WhisperServer
    }

    fn name(&self) -> &str {
        "Whisper server"
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        opts: &TranscribeOptions,
    ) -> Result<Transcript, TranscribeError> {
        let file_part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| TranscribeError::permanent(format!("invalid content type: {}", e)))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("response_format", "json");

        if let Some(lang) = &opts.language {
            form = form.text("language", lang.clone());
        }

        let url = format!("{}/inference", self.base_url);
        tracing::debug!(url = %url, file = file_name, "whisper server inference request");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status.as_u16(), &body));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::transient(format!("failed to parse response: {}", e)))?;

        Ok(Transcript::plain(parsed.text.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_response_parses_text_only() {
        let json = r#"{"text": " so it goes \n"}"#;
        let parsed: InferenceResponse = serde_json::from_str(json).unwrap();
        let transcript = Transcript::plain(parsed.text.trim());
        assert_eq!(transcript.text, "so it goes");
        assert!(transcript.words.is_empty());
    }

    #[test]
    fn base_url_defaults_to_localhost() {
        let backend = WhisperServerTranscriber::new(&BackendConfig::default());
        assert_eq!(backend.base_url, DEFAULT_BASE_URL);

        let mut config = BackendConfig::default();
        config.base_url = Some("http://10.0.0.5:9000".to_string());
        let backend = WhisperServerTranscriber::new(&config);
        assert_eq!(backend.base_url, "http://10.0.0.5:9000");
    }
}
