//! OpenAI REST adapter for transcription, chat completion and speech

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use tracing::debug;

use super::provider::{ChatCompletion, ChatMessage, SpeechToText, TextToSpeech};
use crate::audio::AudioBlob;
use crate::config::GatewayConfig;
use crate::error::ProviderFailure;

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
    chat_model: String,
    speech_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    /// Deadlines are enforced per call by the gateways, so the client has none
    pub fn new(api_key: impl Into<String>, config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            transcription_model: config.transcription_model.clone(),
            chat_model: config.chat_model.clone(),
            speech_model: config.speech_model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderFailure> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_http_error(status, body))
    }
}

fn map_http_error(status: StatusCode, body: String) -> ProviderFailure {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    ProviderFailure::http(status.as_u16(), message)
}

/// Connection failures and resets are retryable, everything else is not
fn map_send_error(err: reqwest::Error) -> ProviderFailure {
    if err.is_connect() || is_connection_reset(&err) {
        ProviderFailure::connection_reset(err.to_string())
    } else {
        ProviderFailure::other(err.to_string())
    }
}

fn is_connection_reset(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = current.source();
    }
    false
}

fn decode_error(err: reqwest::Error) -> ProviderFailure {
    if is_connection_reset(&err) {
        ProviderFailure::connection_reset(err.to_string())
    } else {
        ProviderFailure::other(format!("failed to parse OpenAI response: {}", err))
    }
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(&self, audio: &AudioBlob, language: &str) -> Result<String, ProviderFailure> {
        let part = multipart::Part::bytes(audio.data.clone())
            .file_name(audio.file_name())
            .mime_str(&audio.mime_type)
            .map_err(|e| ProviderFailure::other(format!("invalid audio MIME type: {}", e)))?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone())
            .text("language", language.to_string());

        debug!("POST {} ({} bytes)", self.url("audio/transcriptions"), audio.len());

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let body: TranscriptionResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(decode_error)?;

        Ok(body.text)
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderFailure> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let body: ChatResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(decode_error)?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderFailure::other("chat completion returned no choices"))
    }
}

#[async_trait]
impl TextToSpeech for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderFailure> {
        let request = SpeechRequest {
            model: &self.speech_model,
            voice,
            input: text,
        };

        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let bytes = Self::check(response)
            .await?
            .bytes()
            .await
            .map_err(decode_error)?;

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_message_is_extracted() {
        let failure = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#.to_string(),
        );
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.message, "Rate limit reached");
        assert!(failure.is_retryable());
    }

    #[test]
    fn test_plain_error_body_is_kept() {
        let failure = map_http_error(StatusCode::BAD_REQUEST, "nope".to_string());
        assert_eq!(failure.message, "nope");
        assert!(!failure.is_retryable());
    }

    #[test]
    fn test_reset_is_found_in_source_chain() {
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(is_connection_reset(&err));

        let err = io::Error::new(io::ErrorKind::InvalidData, "garbage");
        assert!(!is_connection_reset(&err));
    }
}
