use crate::config::{AudioConfig, GatewayConfig};

/// User id used for saves while nobody is signed in
pub const ANONYMOUS_USER: &str = "anonymous";

/// Configuration for the session orchestrator
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Recordings smaller than this are treated as silence
    pub min_recording_bytes: usize,

    /// Completed turns kept in memory for prompt context
    pub history_window: usize,

    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_recording_bytes: 1024,
            history_window: 10,
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    pub fn from_config(audio: &AudioConfig, gateway: &GatewayConfig) -> Self {
        Self {
            min_recording_bytes: audio.min_recording_bytes,
            history_window: gateway.history_turns,
            ..Self::default()
        }
    }
}
