//! Ports to the hosting shell
//!
//! The orchestrator never talks to a console, a window, or a notification
//! system directly. Whoever hosts the engine passes these in at
//! construction; tests pass mocks.

use async_trait::async_trait;

use deskscribe_types::JobStage;

use crate::error::TranscribeError;

/// What the user chose when a chunk could not be transcribed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Try the same chunk again (with a fresh retry budget)
    Retry,
    /// Mark this chunk failed and move on
    GiveUp,
    /// Abandon the whole job
    CancelJob,
}

/// Receives a prompt when automatic handling is exhausted: a chunk ran out
/// of transient retries, or the backend returned an ambiguous result.
/// Awaiting the answer is the suspension point; implementations may block
/// on a human for minutes.
#[async_trait]
pub trait DecisionPort: Send + Sync {
    async fn on_chunk_stalled(&self, chunk_index: usize, error: &TranscribeError) -> Decision;
}

/// Receives human-readable progress, one call per stage change.
pub trait ProgressSink: Send + Sync {
    fn on_stage(&self, stage: JobStage, detail: &str);
}

/// Sink that drops all progress. Useful for tests and batch runs.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_stage(&self, _stage: JobStage, _detail: &str) {}
}

/// Port that never retries. The safe default when nobody can answer.
pub struct AlwaysGiveUp;

#[async_trait]
impl DecisionPort for AlwaysGiveUp {
    async fn on_chunk_stalled(&self, chunk_index: usize, error: &TranscribeError) -> Decision {
        tracing::warn!(chunk = chunk_index, "no decision port attached, giving up: {}", error);
        Decision::GiveUp
    }
}
