use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::provider::SpeechToText;
use super::retry::{is_retryable, with_retry, with_timeout, RetryPolicy};
use crate::audio::AudioBlob;
use crate::error::GatewayError;

/// Returned when the provider hears nothing it can transcribe
pub const EMPTY_TRANSCRIPT_FALLBACK: &str =
    "I couldn't make out any words in that recording.";

/// Speech-to-text with input validation, timeout and retry
pub struct TranscriptionGateway {
    provider: Arc<dyn SpeechToText>,
    policy: RetryPolicy,
    timeout: Duration,
    language: String,
    min_audio_bytes: usize,
}

impl TranscriptionGateway {
    pub fn new(provider: Arc<dyn SpeechToText>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            language: "en".to_string(),
            min_audio_bytes: 1024,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_min_audio_bytes(mut self, min_audio_bytes: usize) -> Self {
        self.min_audio_bytes = min_audio_bytes;
        self
    }

    pub fn min_audio_bytes(&self) -> usize {
        self.min_audio_bytes
    }

    pub async fn transcribe(&self, audio: Option<&AudioBlob>) -> Result<String, GatewayError> {
        let audio = audio.ok_or_else(|| GatewayError::InvalidInput("no audio recorded".to_string()))?;

        if audio.len() < self.min_audio_bytes {
            return Err(GatewayError::InvalidInput(format!(
                "recording too small ({} bytes), likely silence",
                audio.len()
            )));
        }

        info!(
            "Transcribing {} bytes of {} ({} ms)",
            audio.len(),
            audio.mime_type,
            audio.duration_ms
        );

        let text = with_retry(&self.policy, "transcription", is_retryable, || {
            with_timeout(self.timeout, self.provider.transcribe(audio, &self.language))
        })
        .await?;

        let text = text.trim();
        if text.is_empty() {
            warn!("Transcription came back empty");
            return Ok(EMPTY_TRANSCRIPT_FALLBACK.to_string());
        }

        info!("Transcription complete ({} chars)", text.len());
        Ok(text.to_string())
    }
}
