//! Error types shared across the capture, gateway, store and session layers

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionStatus;

/// Errors raised while acquiring or finalizing microphone audio
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Permission denied or no input device present
    #[error("microphone unavailable: {0}")]
    Device(String),

    /// The recorded buffer could not be encoded
    #[error("failed to encode recording: {0}")]
    Encode(String),
}

/// A failure reported by an external provider (STT, chat, TTS)
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}{message}", .status.map(|s| format!("HTTP {s}: ")).unwrap_or_default())]
pub struct ProviderFailure {
    /// HTTP-like status code, when the provider returned one
    pub status: Option<u16>,
    /// Connection reset / dropped before a response arrived
    pub connection_reset: bool,
    pub message: String,
}

impl ProviderFailure {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            connection_reset: false,
            message: message.into(),
        }
    }

    pub fn connection_reset(message: impl Into<String>) -> Self {
        Self {
            status: None,
            connection_reset: true,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            status: None,
            connection_reset: false,
            message: message.into(),
        }
    }

    /// Rate limits, server errors and connection resets are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self.status {
            Some(429) => true,
            Some(status) if status >= 500 => true,
            _ => self.connection_reset,
        }
    }
}

/// Errors surfaced by the retrying gateways
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider error: {0}")]
    Provider(ProviderFailure),

    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: ProviderFailure,
    },
}

/// Remote persistence failure; always absorbed by the conversation store
#[derive(Error, Debug, Clone)]
pub enum RemoteStoreError {
    #[error("remote store timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote store request failed: {0}")]
    Request(String),

    #[error("unexpected remote store response: {0}")]
    Decode(String),
}

/// Authentication backend failures
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("authentication is not configured")]
    Unavailable,

    #[error("authentication rejected: {0}")]
    Rejected(String),

    #[error("authentication request failed: {0}")]
    Request(String),
}

/// Processing stage a gateway failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transcription,
    Generation,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Transcription => "transcription",
            Stage::Generation => "generation",
            Stage::Synthesis => "synthesis",
        };
        f.write_str(name)
    }
}

/// Errors reported by the session state machine
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("microphone unavailable: {0}")]
    Device(String),

    #[error("no usable audio was recorded")]
    EmptyRecording,

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: GatewayError,
    },

    #[error("cannot {action} while {status}")]
    InvalidState {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("audio capture failed: {0}")]
    Capture(String),

    #[error("session was reset while processing")]
    Cancelled,
}

impl SessionError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SessionError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Device(msg) => SessionError::Device(msg),
            CaptureError::Encode(msg) => SessionError::Capture(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderFailure::http(429, "slow down").is_retryable());
        assert!(ProviderFailure::http(500, "boom").is_retryable());
        assert!(ProviderFailure::http(503, "unavailable").is_retryable());
        assert!(ProviderFailure::connection_reset("reset by peer").is_retryable());

        assert!(!ProviderFailure::http(400, "bad request").is_retryable());
        assert!(!ProviderFailure::http(401, "unauthorized").is_retryable());
        assert!(!ProviderFailure::other("parse error").is_retryable());
    }

    #[test]
    fn test_provider_failure_display() {
        let err = ProviderFailure::http(503, "unavailable");
        assert_eq!(err.to_string(), "HTTP 503: unavailable");

        let err = ProviderFailure::other("no body");
        assert_eq!(err.to_string(), "no body");
    }

    #[test]
    fn test_stage_tagged_message() {
        let err = SessionError::Stage {
            stage: Stage::Generation,
            source: GatewayError::Timeout(Duration::from_secs(30)),
        };
        assert!(err.to_string().starts_with("generation failed"));
        assert_eq!(err.stage(), Some(Stage::Generation));
    }
}
