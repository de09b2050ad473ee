use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/session/record/start", post(handlers::start_recording))
        .route("/session/record/stop", post(handlers::stop_recording))
        .route("/session/reset", post(handlers::reset_session))
        .route("/session/status", get(handlers::get_session_status))
        // Emotion sampling
        .route("/emotion/frame", post(handlers::upload_frame))
        .route("/emotion/trend", get(handlers::get_emotion_trend))
        // Conversation history
        .route("/conversations/:user_id", get(handlers::get_conversations))
        // Authentication
        .route("/auth/login", post(handlers::login))
        .route("/auth/register", post(handlers::register))
        .route("/auth/logout", post(handlers::logout))
        // Request logging outermost, then CORS for browser clients
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
