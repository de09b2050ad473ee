use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::provider::TextToSpeech;
use super::retry::{is_retryable, with_retry, with_timeout, RetryPolicy};
use crate::error::GatewayError;

pub const DEFAULT_VOICE: &str = "alloy";

/// Keyword set that selects a voice
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCategory {
    pub name: String,
    pub keywords: Vec<String>,
    pub voice: String,
}

impl VoiceCategory {
    pub fn new(name: &str, keywords: &[&str], voice: &str) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            voice: voice.to_string(),
        }
    }

    /// A word matches when it starts with one of the keywords
    fn matches(&self, words: &[String]) -> bool {
        words
            .iter()
            .any(|word| self.keywords.iter().any(|k| word.starts_with(k.as_str())))
    }
}

/// Ordered keyword categories; the first category with a hit wins
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    categories: Vec<VoiceCategory>,
    default_voice: String,
}

impl Default for VoiceSelector {
    fn default() -> Self {
        Self {
            categories: vec![
                VoiceCategory::new(
                    "distress",
                    &["sad", "grief", "griev", "lonely", "hopeless", "hurt", "loss", "cry"],
                    "shimmer",
                ),
                VoiceCategory::new(
                    "anxiety",
                    &["anxi", "worr", "nervous", "panic", "afraid", "scared", "stress", "overwhelm"],
                    "nova",
                ),
                VoiceCategory::new(
                    "anger",
                    &["angry", "anger", "frustrat", "furious", "annoy", "irritat"],
                    "onyx",
                ),
                VoiceCategory::new(
                    "joy",
                    &["happy", "glad", "excit", "grateful", "proud", "wonderful", "celebrat"],
                    "fable",
                ),
            ],
            default_voice: DEFAULT_VOICE.to_string(),
        }
    }
}

impl VoiceSelector {
    pub fn new(categories: Vec<VoiceCategory>, default_voice: impl Into<String>) -> Self {
        Self {
            categories,
            default_voice: default_voice.into(),
        }
    }

    pub fn select(&self, text: &str) -> &str {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        self.categories
            .iter()
            .find(|category| category.matches(&words))
            .map(|category| {
                debug!("Voice category '{}' matched", category.name);
                category.voice.as_str()
            })
            .unwrap_or(&self.default_voice)
    }
}

/// Synthesized reply audio
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub voice: String,
}

/// Text-to-speech with voice selection, timeout and retry
pub struct SpeechGateway {
    provider: Arc<dyn TextToSpeech>,
    voices: VoiceSelector,
    policy: RetryPolicy,
    timeout: Duration,
}

impl SpeechGateway {
    pub fn new(provider: Arc<dyn TextToSpeech>) -> Self {
        Self {
            provider,
            voices: VoiceSelector::default(),
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_voices(mut self, voices: VoiceSelector) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn synthesize(&self, text: &str) -> Result<SpeechAudio, GatewayError> {
        if text.trim().is_empty() {
            return Err(GatewayError::InvalidInput("nothing to synthesize".to_string()));
        }

        let voice = self.voices.select(text).to_string();
        info!("Synthesizing {} chars with voice '{}'", text.len(), voice);

        let data = with_retry(&self.policy, "speech synthesis", is_retryable, || {
            with_timeout(self.timeout, self.provider.synthesize(text, &voice))
        })
        .await?;

        Ok(SpeechAudio {
            data,
            mime_type: self.provider.mime_type().to_string(),
            voice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_category_wins() {
        let voices = VoiceSelector::default();
        // "sad" (distress) and "worried" (anxiety) both match; distress is listed first
        assert_eq!(voices.select("I'm worried and sad"), "shimmer");
        assert_eq!(voices.select("I'm so worried about tomorrow"), "nova");
        assert_eq!(voices.select("That sounds frustrating."), "onyx");
        assert_eq!(voices.select("I'm proud of you!"), "fable");
    }

    #[test]
    fn test_default_voice() {
        let voices = VoiceSelector::default();
        assert_eq!(voices.select("Tell me more about your day."), DEFAULT_VOICE);
        assert_eq!(voices.select(""), DEFAULT_VOICE);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let voices = VoiceSelector::default();
        assert_eq!(voices.select("HAPPY to hear it"), "fable");
    }
}
