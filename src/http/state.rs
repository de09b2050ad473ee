use crate::emotion::{EmotionSampler, LatestFrame};
use crate::session::SessionOrchestrator;
use crate::store::{AuthProvider, ConversationStore};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Service name reported by the health check
    pub service: String,

    pub session: Arc<SessionOrchestrator>,

    pub sampler: Arc<EmotionSampler>,

    /// Uploaded camera frames consumed by the sampler
    pub frames: Arc<LatestFrame>,

    pub store: Arc<ConversationStore>,

    /// `None` when no auth backend is configured
    pub auth: Option<Arc<dyn AuthProvider>>,
}
