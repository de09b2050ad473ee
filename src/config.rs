use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub emotion: EmotionConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub chunk_interval_ms: u64,
    pub meter_interval_ms: u64,
    /// Ordered codec preference, first producible entry wins
    pub preferred_codecs: Vec<String>,
    /// Blobs below this size are treated as likely silence
    pub min_recording_bytes: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            chunk_interval_ms: 1000,
            meter_interval_ms: 100,
            preferred_codecs: vec![
                "audio/webm;codecs=opus".to_string(),
                "audio/ogg;codecs=opus".to_string(),
                "audio/wav".to_string(),
            ],
            min_recording_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    pub sample_interval_ms: u64,
    pub face_absence_ms: u64,
    pub history_capacity: usize,
    /// Detector service endpoint; sampling is disabled when unset
    pub detector_url: Option<String>,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 300,
            face_absence_ms: 3000,
            history_capacity: 20,
            detector_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub openai_base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub speech_model: String,
    pub language: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub transcription_timeout_secs: u64,
    pub response_timeout_secs: u64,
    pub speech_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub history_turns: usize,
    /// Optional text file replacing the built-in therapist prompt
    pub therapist_prompt_path: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            speech_model: "tts-1".to_string(),
            language: "en".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            transcription_timeout_secs: 30,
            response_timeout_secs: 30,
            speech_timeout_secs: 30,
            max_retries: 2,
            initial_backoff_ms: 1000,
            history_turns: 10,
            therapist_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub local_path: String,
    pub local_capacity: usize,
    pub collection: String,
    pub remote_timeout_secs: u64,
    pub error_threshold: u32,
    pub recovery_window_secs: u64,
    /// Period of the remote reachability check
    pub connectivity_check_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            local_path: "data/conversations".to_string(),
            local_capacity: 100,
            collection: "conversations".to_string(),
            remote_timeout_secs: 10,
            error_threshold: 3,
            recovery_window_secs: 60,
            connectivity_check_secs: 30,
        }
    }
}

impl Config {
    /// Load from a config file (any format the `config` crate detects) with
    /// `SERENITY__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SERENITY").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Provider credentials injected through the environment
#[derive(Debug, Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub firebase: Option<FirebaseCredentials>,
}

#[derive(Debug, Clone)]
pub struct FirebaseCredentials {
    pub api_key: String,
    pub project_id: String,
}

impl Credentials {
    /// `OPENAI_API_KEY` is mandatory; Firebase is optional and both of its
    /// variables must be present for the remote store to be enabled
    pub fn from_env() -> Result<Self> {
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set for the speech and chat gateways")?;

        let firebase = match (
            std::env::var("FIREBASE_API_KEY"),
            std::env::var("FIREBASE_PROJECT_ID"),
        ) {
            (Ok(api_key), Ok(project_id)) => Some(FirebaseCredentials {
                api_key,
                project_id,
            }),
            _ => None,
        };

        Ok(Self {
            openai_api_key,
            firebase,
        })
    }
}

impl AudioConfig {
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn meter_interval(&self) -> Duration {
        Duration::from_millis(self.meter_interval_ms)
    }
}
