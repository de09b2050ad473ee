//! Conversation session orchestration
//!
//! This module provides the `SessionOrchestrator` state machine that drives:
//! - Microphone recording through `AudioCapture`
//! - Transcription, reply generation and speech synthesis
//! - Emotion context from the running `EmotionSampler`
//! - Fire-and-forget persistence through `ConversationStore`

mod config;
mod session;
mod stats;

pub use config::{SessionConfig, ANONYMOUS_USER};
pub use session::SessionOrchestrator;
pub use stats::{CompletedTurn, SessionEvent, SessionSnapshot, SessionStatus};
