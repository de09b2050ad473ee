use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::prompt::{ChatTurn, PromptBuilder};
use super::provider::ChatCompletion;
use super::retry::{is_retryable, with_retry, with_timeout, RetryPolicy};
use crate::emotion::EmotionContext;
use crate::error::{GatewayError, ProviderFailure};

/// Generates the companion's reply from transcript, emotion and history
pub struct ResponseGateway {
    provider: Arc<dyn ChatCompletion>,
    prompt: PromptBuilder,
    policy: RetryPolicy,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    history_turns: usize,
}

impl ResponseGateway {
    pub fn new(provider: Arc<dyn ChatCompletion>, prompt: PromptBuilder) -> Self {
        Self {
            provider,
            prompt,
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            max_tokens: 150,
            temperature: 0.7,
            history_turns: 10,
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

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_history_turns(mut self, history_turns: usize) -> Self {
        self.history_turns = history_turns;
        self
    }

    pub async fn generate(
        &self,
        user_text: &str,
        context: Option<&EmotionContext>,
        history: &[ChatTurn],
    ) -> Result<String, GatewayError> {
        if user_text.trim().is_empty() {
            return Err(GatewayError::InvalidInput("empty user text".to_string()));
        }

        let recent = &history[history.len().saturating_sub(self.history_turns)..];
        let messages = self.prompt.build_messages(user_text, context, recent);

        info!(
            "Generating response ({} messages, emotion: {})",
            messages.len(),
            context.map(|c| c.dominant.as_str()).unwrap_or("none")
        );

        let reply = with_retry(&self.policy, "response generation", is_retryable, || {
            with_timeout(
                self.timeout,
                self.provider
                    .complete(&messages, self.max_tokens, self.temperature),
            )
        })
        .await?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(GatewayError::Provider(ProviderFailure::other(
                "chat model returned an empty reply",
            )));
        }

        Ok(reply.to_string())
    }
}
