//! OpenAI transcription backend
//!
//! Talks to the OpenAI audio transcription API (whisper-1 and the
//! gpt-4o-transcribe family share this endpoint). Requests verbose JSON so
//! the response carries language, duration, and, when asked for, word-level
//! timestamps.
//! Docs: https://platform.openai.com/docs/api-reference/audio/createTranscription

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use deskscribe_types::{Transcript, TranscriptWord};

use crate::config::{BackendConfig, SttBackendKind};
use crate::error::TranscribeError;
use crate::stt::{
    classify_http_status, classify_transport_error, mime_for, SpeechToText, TranscribeOptions,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Verbose JSON response shape
#[derive(Debug, Deserialize)]
struct ApiResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    words: Option<Vec<ApiWord>>,
}

/// One word with times in seconds
#[derive(Debug, Deserialize)]
struct ApiWord {
    word: String,
    start: f64,
    end: f64,
}

pub struct OpenAiTranscriber {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn to_transcript(response: ApiResponse) -> Transcript {
        let words = response
            .words
            .unwrap_or_default()
            .into_iter()
            .map(|w| TranscriptWord {
                start: (w.start * 1000.0).round() as i64,
                end: (w.end * 1000.0).round() as i64,
                text: w.word,
            })
            .collect();

        Transcript {
            text: response.text.trim().to_string(),
            words,
            language: response.language,
            duration_secs: response.duration,
        }
    }
}

#[async_trait]
impl SpeechToText for OpenAiTranscriber {
    fn id(&self) -> SttBackendKind {
        SttBackendKind::OpenAi
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        opts: &TranscribeOptions,
    ) -> Result<Transcript, TranscribeError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TranscribeError::permanent("OpenAI API key is not configured"))?;

        let file_part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| TranscribeError::permanent(format!("invalid content type: {}", e)))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        if opts.word_timestamps {
            form = form.text("timestamp_granularities[]", "word");
        }
        if let Some(lang) = &opts.language {
            form = form.text("language", lang.clone());
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        tracing::debug!(model = %self.model, file = file_name, "OpenAI transcription request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
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

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::transient(format!("failed to parse response: {}", e)))?;

        Ok(Self::to_transcript(parsed))
    }
}
