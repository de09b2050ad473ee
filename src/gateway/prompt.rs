use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use super::provider::ChatMessage;
use crate::emotion::EmotionContext;

const DEFAULT_THERAPIST_PROMPT: &str = "\
You are SerenityPod, a warm and non-judgmental companion offering emotional \
support. Listen closely, reflect back both what the user says and how they \
seem to feel, and help them make sense of it.

Draw on evidence-based approaches as the moment calls for them: gentle \
cognitive reframing of unhelpful thoughts, emotion regulation and grounding \
skills, mindfulness and self-compassion, and attention to the user's \
strengths and relationships.

Shape each reply like this: validate the experience first, offer one \
insight or change of perspective, suggest a small practical step when it \
helps, and close with an invitation to keep talking.

Keep replies short and conversational; they will be spoken aloud. You are \
not a clinician: do not diagnose or give medical advice, and encourage \
professional help whenever safety is at stake.";

const NO_EMOTION_GUIDANCE: &str =
    "No clear emotion detected. Respond with balanced support and gentle exploration.";

const GENERIC_GUIDANCE: &str =
    "Respond with balanced therapeutic support and explore the user's emotional state.";

/// Per-label tone adjustments
const EMOTION_ADAPTATIONS: &[(&str, &str)] = &[
    ("happy", "Focus on positive reinforcement and growth-oriented approaches."),
    ("sad", "Offer compassionate validation and gentle reframing."),
    ("angry", "Emphasize emotion regulation skills and mindful awareness."),
    ("fearful", "Prioritize grounding, reassurance and coping strategies."),
    ("surprised", "Help process and integrate the unexpected experience."),
    ("disgusted", "Explore core values and examine reactions without judgment."),
    ("neutral", "Balance assessment and exploration of several emotional dimensions."),
];

/// One completed user/assistant exchange kept for prompt context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

/// Builds the layered message list sent to the chat model
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    therapist_prompt: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            therapist_prompt: DEFAULT_THERAPIST_PROMPT.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new(therapist_prompt: impl Into<String>) -> Self {
        Self {
            therapist_prompt: therapist_prompt.into(),
        }
    }

    /// Use the prompt in `path`, keeping the built-in one if the file is
    /// unreadable or empty
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                info!("Loaded therapist prompt from {}", path.display());
                Self::new(text.trim())
            }
            Ok(_) => {
                warn!("Therapist prompt file {} is empty, using default", path.display());
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Could not read therapist prompt {}: {}, using default",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn therapist_prompt(&self) -> &str {
        &self.therapist_prompt
    }

    /// Guidance line describing the user's emotional state
    pub fn emotion_guidance(&self, context: Option<&EmotionContext>) -> String {
        let Some(context) = context else {
            return NO_EMOTION_GUIDANCE.to_string();
        };

        let label = context.dominant.to_lowercase();
        let adaptation = EMOTION_ADAPTATIONS
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, text)| *text)
            .unwrap_or(GENERIC_GUIDANCE);

        let mut guidance = format!(
            "The user appears {} ({} intensity, confidence {:.2}). {}",
            label, context.intensity, context.score, adaptation
        );

        if context.ambivalent {
            match &context.secondary {
                Some(secondary) => guidance.push_str(&format!(
                    " Their signals are mixed, with traces of {}; acknowledge the ambivalence instead of assuming one feeling.",
                    secondary
                )),
                None => guidance.push_str(
                    " Their signals are weak or mixed; check in rather than assuming how they feel.",
                ),
            }
        }

        guidance
    }

    /// System prompt, emotion guidance, prior turns, then the current text
    pub fn build_messages(
        &self,
        user_text: &str,
        context: Option<&EmotionContext>,
        history: &[ChatTurn],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 3);
        messages.push(ChatMessage::system(self.therapist_prompt.clone()));

        if context.is_some() {
            messages.push(ChatMessage::system(format!(
                "User's current emotional state: {}",
                self.emotion_guidance(context)
            )));
        }

        for turn in history {
            messages.push(ChatMessage::user(turn.user.clone()));
            if !turn.assistant.is_empty() {
                messages.push(ChatMessage::assistant(turn.assistant.clone()));
            }
        }

        messages.push(ChatMessage::user(user_text));
        messages
    }
}
