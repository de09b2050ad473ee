//! External speech and chat gateways
//!
//! - `TranscriptionGateway`: recorded audio to text
//! - `ResponseGateway`: transcript, emotion context and history to a reply
//! - `SpeechGateway`: reply text to spoken audio
//!
//! All three share one retry policy and enforce a per-call timeout. Providers
//! sit behind traits; `OpenAiClient` implements all of them.

mod openai;
mod prompt;
mod provider;
mod response;
mod retry;
mod speech;
mod transcription;

use std::sync::Arc;
use std::time::Duration;

pub use openai::OpenAiClient;
pub use prompt::{ChatTurn, PromptBuilder};
pub use provider::{ChatCompletion, ChatMessage, ChatRole, SpeechToText, TextToSpeech};
pub use response::ResponseGateway;
pub use retry::{is_retryable, with_retry, with_timeout, RetryPolicy};
pub use speech::{SpeechAudio, SpeechGateway, VoiceCategory, VoiceSelector, DEFAULT_VOICE};
pub use transcription::{TranscriptionGateway, EMPTY_TRANSCRIPT_FALLBACK};

use crate::config::GatewayConfig;

/// The three gateways a session drives
pub struct Gateways {
    pub transcription: TranscriptionGateway,
    pub response: ResponseGateway,
    pub speech: SpeechGateway,
}

impl Gateways {
    /// Build all three gateways from configuration
    pub fn from_config(
        config: &GatewayConfig,
        min_audio_bytes: usize,
        stt: Arc<dyn SpeechToText>,
        chat: Arc<dyn ChatCompletion>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        let policy = RetryPolicy::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
        );

        let prompt = match &config.therapist_prompt_path {
            Some(path) => PromptBuilder::from_file(path),
            None => PromptBuilder::default(),
        };

        Self {
            transcription: TranscriptionGateway::new(stt)
                .with_policy(policy.clone())
                .with_timeout(Duration::from_secs(config.transcription_timeout_secs))
                .with_language(config.language.clone())
                .with_min_audio_bytes(min_audio_bytes),
            response: ResponseGateway::new(chat, prompt)
                .with_policy(policy.clone())
                .with_timeout(Duration::from_secs(config.response_timeout_secs))
                .with_sampling(config.max_tokens, config.temperature)
                .with_history_turns(config.history_turns),
            speech: SpeechGateway::new(tts)
                .with_policy(policy)
                .with_timeout(Duration::from_secs(config.speech_timeout_secs)),
        }
    }
}
