use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::emotion::EmotionContext;
use crate::error::Stage;
use crate::gateway::SpeechAudio;

/// Processing state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Recording,
    Transcribing,
    Generating,
    Synthesizing,
    Error,
}

impl SessionStatus {
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            SessionStatus::Transcribing | SessionStatus::Generating | SessionStatus::Synthesizing
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Transcribing => "transcribing",
            SessionStatus::Generating => "generating",
            SessionStatus::Synthesizing => "synthesizing",
            SessionStatus::Error => "error",
        })
    }
}

/// Notifications published while the session runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Status { status: SessionStatus },
    Transcript { text: String },
    Response { text: String },
    Error { stage: Option<Stage>, message: String },
    Reset,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub user_id: String,

    /// Live microphone level (0..=100), 0 unless recording
    pub volume: u8,

    pub face_present: bool,

    /// Completed turns held for prompt context
    pub history_len: usize,

    pub recording_started_at: Option<DateTime<Utc>>,
}

/// Result of one full recording → reply cycle
#[derive(Debug, Clone)]
pub struct CompletedTurn {
    pub transcript: String,
    pub response: String,
    pub emotion: Option<EmotionContext>,
    pub speech: SpeechAudio,
    /// Id of the persisted exchange
    pub exchange_id: String,
}
