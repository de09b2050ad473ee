pub mod audio;
pub mod config;
pub mod emotion;
pub mod error;
pub mod gateway;
pub mod http;
pub mod session;
pub mod store;

pub use audio::{
    AudioBackend, AudioBackendFactory, AudioBlob, AudioCapture, AudioFile, AudioFrame,
    AudioSource, CaptureConfig,
};
pub use config::{Config, Credentials};
pub use emotion::{EmotionContext, EmotionSample, EmotionSampler, EmotionTrend, SamplerConfig};
pub use error::{CaptureError, GatewayError, ProviderFailure, SessionError, Stage};
pub use gateway::{Gateways, OpenAiClient, ResponseGateway, SpeechGateway, TranscriptionGateway};
pub use http::{create_router, AppState};
pub use session::{CompletedTurn, SessionConfig, SessionEvent, SessionOrchestrator, SessionStatus};
pub use store::{ConversationExchange, ConversationStore, LocalStore, RemoteStore};
