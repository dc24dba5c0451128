//! Shared types for Deskscribe
//!
//! This crate contains the data structures passed between the audio layer,
//! the transcription engine, and whatever shell hosts them. It performs no
//! I/O of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Transcript Types
// ============================================================================

/// A single word with timing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptWord {
    /// Start time in milliseconds
    pub start: i64,
    /// End time in milliseconds
    pub end: i64,
    /// The word text
    pub text: String,
}

/// Result of transcribing one audio file or chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Full transcribed text
    pub text: String,
    /// Word-level timestamps, empty when the backend did not supply them
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
    /// Detected language (ISO 639-1 code)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Audio duration as reported by the backend, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl Transcript {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            words: Vec::new(),
            language: None,
            duration_secs: None,
        }
    }

    /// True when the backend produced no usable text at all.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// ============================================================================
// Source Attribution Types
// ============================================================================

/// Which input was producing sound during a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveSource {
    /// Microphone only
    User,
    /// System loopback only
    System,
    /// Both inputs at once
    Both,
    /// Neither input
    None,
}

/// One stretch of the session timeline attributed to a source.
///
/// A full session's segments form a partition of the timeline: no gaps,
/// no overlaps, sorted by start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySegment {
    /// Start time in milliseconds
    pub start: i64,
    /// End time in milliseconds
    pub end: i64,
    pub source: ActiveSource,
}

impl ActivitySegment {
    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, instant_ms: i64) -> bool {
        instant_ms >= self.start && instant_ms < self.end
    }
}

// ============================================================================
// Silence Analysis Types
// ============================================================================

/// Derived, read-only snapshot of one silence/speech analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceReport {
    /// Total audio duration in seconds
    pub total_secs: f64,
    /// Estimated non-silent duration in seconds
    pub useful_secs: f64,
    /// Fraction of the recording classified as silence (0.0 - 1.0)
    pub silence_ratio: f64,
    /// Duration above the large-recording threshold AND silence ratio above
    /// the percentage threshold (both must hold)
    pub large_mostly_silent: bool,
    /// Useful duration meets the minimum-speech threshold
    pub has_min_speech: bool,
}

// ============================================================================
// Recording Manifest Types
// ============================================================================

/// Persisted manifest row for one retained recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    /// Opaque unique id
    pub id: String,
    /// Primary audio file name (relative to the recordings directory)
    pub audio_file: String,
    /// When the recording started
    pub recorded_at: DateTime<Utc>,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Size of the primary audio file in bytes
    pub size_bytes: u64,
    /// First part of the transcript, for list display
    #[serde(default)]
    pub preview: String,
    /// Transcript text file, when one was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_file: Option<String>,
    /// Recording captured both microphone and system audio
    #[serde(default)]
    pub dual_source: bool,
}

// ============================================================================
// Job Progress Types
// ============================================================================

/// Pipeline stage, reported through the progress port as the job advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Analyzing,
    Splitting,
    Transcribing,
    Retrying,
    Attributing,
    Saving,
}

/// Per-chunk timing telemetry, returned alongside the final transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReport {
    /// Zero-based chunk index
    pub index: usize,
    /// Attempts consumed, including the successful one
    pub attempts: u32,
    /// Wall-clock time spent on this chunk in milliseconds
    pub elapsed_ms: u64,
    /// Chunk ended with a failure marker
    #[serde(default)]
    pub failed: bool,
}

// ============================================================================
// Audio Device Types
// ============================================================================

/// Audio input device information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDevice {
    /// Human-readable device name, also used as the selection key
    pub name: String,
    /// Whether this is the default input device
    pub is_default: bool,
    /// Number of input channels
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_empty_detection() {
        assert!(Transcript::plain("").is_empty());
        assert!(Transcript::plain("   \n\t").is_empty());
        assert!(!Transcript::plain("hello").is_empty());
    }

    #[test]
    fn activity_segment_contains_half_open() {
        let seg = ActivitySegment {
            start: 1000,
            end: 2000,
            source: ActiveSource::User,
        };
        assert!(seg.contains(1000));
        assert!(seg.contains(1999));
        assert!(!seg.contains(2000));
        assert_eq!(seg.duration_ms(), 1000);
    }

    #[test]
    fn recording_entry_serializes_camel_case() {
        let entry = RecordingEntry {
            id: "r1".into(),
            audio_file: "sess_20260101_100000_processed.wav".into(),
            recorded_at: Utc::now(),
            duration_secs: 12.5,
            size_bytes: 4096,
            preview: "hello".into(),
            transcript_file: None,
            dual_source: false,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"audioFile\""));
        assert!(json.contains("\"durationSecs\""));
        // None fields are omitted entirely
        assert!(!json.contains("transcriptFile"));
    }

    #[test]
    fn transcript_words_default_when_missing() {
        let t: Transcript = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(t.words.is_empty());
        assert_eq!(t.text, "hi");
    }
}
