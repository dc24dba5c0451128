//! Error taxonomy for the transcription path
//!
//! Every failure that can occur between "we have a finished recording" and
//! "we have a transcript" carries a class that tells the orchestrator what
//! to do with it: give up, retry, or ask the user.

use std::fmt;

/// How a transcription-path failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Misconfiguration, bad credentials, unsupported format. Never retried.
    Permanent,
    /// Network trouble, rate limits, server errors. Retried with backoff.
    Transient,
    /// Ambiguous outcome (e.g. empty transcript). The user decides.
    UserActionRequired,
    /// Disk or container-format failure on our side. Aborts the operation.
    FatalLocal,
}

impl ErrorClass {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClass::Permanent => "permanent",
            ErrorClass::Transient => "transient",
            ErrorClass::UserActionRequired => "user_action_required",
            ErrorClass::FatalLocal => "fatal_local",
        }
    }
}

/// Error type for transcription backends and the orchestrator
#[derive(Debug, Clone)]
pub struct TranscribeError {
    pub class: ErrorClass,
    pub message: String,
}

impl fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.class.label(), self.message)
    }
}

impl std::error::Error for TranscribeError {}

impl TranscribeError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Permanent, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    pub fn user_action(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::UserActionRequired, message)
    }

    pub fn fatal_local(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::FatalLocal, message)
    }

    pub fn auth_error() -> Self {
        Self::permanent("invalid or missing API credentials")
    }

    pub fn rate_limited() -> Self {
        Self::transient("rate limit exceeded")
    }

    pub fn timeout() -> Self {
        Self::transient("request timed out")
    }

    pub fn empty_transcript() -> Self {
        Self::user_action("backend returned an empty transcript (no speech detected?)")
    }

    pub fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

impl From<std::io::Error> for TranscribeError {
    fn from(e: std::io::Error) -> Self {
        Self::fatal_local(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(TranscribeError::rate_limited().is_retryable());
        assert!(TranscribeError::timeout().is_retryable());
        assert!(!TranscribeError::auth_error().is_retryable());
        assert!(!TranscribeError::empty_transcript().is_retryable());
        assert!(!TranscribeError::fatal_local("disk full").is_retryable());
    }

    #[test]
    fn display_carries_class_label() {
        let e = TranscribeError::permanent("bad credentials");
        assert_eq!(e.to_string(), "[permanent] bad credentials");
        let e = TranscribeError::empty_transcript();
        assert!(e.to_string().starts_with("[user_action_required]"));
    }

    #[test]
    fn io_errors_become_fatal_local() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let e: TranscribeError = io.into();
        assert_eq!(e.class, ErrorClass::FatalLocal);
    }
}
