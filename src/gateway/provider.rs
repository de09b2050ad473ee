use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBlob;
use crate::error::ProviderFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Speech-to-text capability
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the audio; `language` is a hint such as "en"
    async fn transcribe(&self, audio: &AudioBlob, language: &str) -> Result<String, ProviderFailure>;
}

/// Chat-completion capability
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderFailure>;
}

/// Speech-synthesis capability
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Returns encoded audio for `text` spoken with `voice`
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderFailure>;

    /// MIME type of the audio returned by `synthesize`
    fn mime_type(&self) -> &str {
        "audio/mpeg"
    }
}
