use super::state::AppState;
use crate::emotion::{EmotionSample, EmotionTrend};
use crate::error::{AuthError, GatewayError, SessionError, Stage};
use crate::session::SessionSnapshot;
use crate::store::{AuthUser, ConnectionHealth, ConversationExchange};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub remote_store: bool,
    pub connection: ConnectionHealth,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub transcript: String,
    pub response: String,
    pub emotion: Option<String>,
    pub exchange_id: String,
    pub voice: String,
    pub audio_mime_type: String,
    /// Synthesized reply, base64 encoded
    pub audio_base64: String,
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub trend: Option<EmotionTrend>,
    pub latest: Option<EmotionSample>,
    pub face_present: bool,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            stage: None,
        }),
    )
        .into_response()
}

fn session_error(err: SessionError) -> Response {
    let status = match &err {
        SessionError::Device(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::EmptyRecording => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Stage {
            source: GatewayError::Timeout(_),
            ..
        } => StatusCode::GATEWAY_TIMEOUT,
        SessionError::Stage { .. } => StatusCode::BAD_GATEWAY,
        SessionError::InvalidState { .. } | SessionError::Cancelled => StatusCode::CONFLICT,
        SessionError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            stage: err.stage(),
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn auth_error(err: AuthError) -> Response {
    let status = match &err {
        AuthError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Rejected(_) => StatusCode::UNAUTHORIZED,
        AuthError::Request(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: state.service.clone(),
        remote_store: state.store.has_remote(),
        connection: state.store.health(),
    })
}

/// POST /session/record/start
/// Start recording the user's reply
pub async fn start_recording(State(state): State<AppState>) -> Response {
    match state.session.start().await {
        Ok(()) => (StatusCode::OK, Json(state.session.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            session_error(e)
        }
    }
}

/// POST /session/record/stop
/// Stop recording and run transcription → reply → speech
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.session.stop().await {
        Ok(turn) => {
            info!("Turn {} completed", turn.exchange_id);
            (
                StatusCode::OK,
                Json(TurnResponse {
                    transcript: turn.transcript,
                    response: turn.response,
                    emotion: turn.emotion.map(|e| e.dominant),
                    exchange_id: turn.exchange_id,
                    voice: turn.speech.voice,
                    audio_mime_type: turn.speech.mime_type,
                    audio_base64: STANDARD.encode(&turn.speech.data),
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Turn did not complete: {}", e);
            session_error(e)
        }
    }
}

/// POST /session/reset
pub async fn reset_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    state.session.reset().await;
    Json(state.session.snapshot())
}

/// GET /session/status
pub async fn get_session_status(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

/// POST /emotion/frame
/// Replace the frame the emotion sampler looks at
pub async fn upload_frame(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty frame");
    }

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();

    state.frames.update(body.to_vec(), mime_type);
    StatusCode::ACCEPTED.into_response()
}

/// GET /emotion/trend
pub async fn get_emotion_trend(State(state): State<AppState>) -> Json<TrendResponse> {
    Json(TrendResponse {
        trend: state.sampler.trend(),
        latest: state.sampler.latest(),
        face_present: !state.sampler.face_lost(),
    })
}

/// History is only served for the user the session currently saves as
fn may_read_history(requested: &str, session_user: &str) -> bool {
    !requested.is_empty() && requested == session_user
}

/// GET /conversations/:user_id
pub async fn get_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    if !may_read_history(&user_id, &state.session.user_id()) {
        warn!("Refused history request for another user");
        return error_response(
            StatusCode::FORBIDDEN,
            "history is only available for the current user",
        );
    }
    let history: Vec<ConversationExchange> = state.store.load(&user_id).await;
    Json(history).into_response()
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Response {
    let Some(auth) = state.auth.clone() else {
        return auth_error(AuthError::Unavailable);
    };
    signed_in(&state, auth.login(&req.email, &req.password).await)
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Response {
    let Some(auth) = state.auth.clone() else {
        return auth_error(AuthError::Unavailable);
    };
    signed_in(&state, auth.register(&req.email, &req.password).await)
}

fn signed_in(state: &AppState, result: Result<AuthUser, AuthError>) -> Response {
    match result {
        Ok(user) => {
            state.session.set_user(Some(user.uid.clone()));
            (StatusCode::OK, Json(user)).into_response()
        }
        Err(e) => {
            warn!("Authentication failed: {}", e);
            auth_error(e)
        }
    }
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>) -> Response {
    let Some(auth) = state.auth.clone() else {
        return auth_error(AuthError::Unavailable);
    };
    match auth.logout().await {
        Ok(()) => {
            state.session.set_user(None);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => auth_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderFailure;
    use crate::session::SessionStatus;
    use std::time::Duration;

    #[test]
    fn test_session_error_status_codes() {
        let cases = vec![
            (SessionError::Device("no mic".to_string()), StatusCode::SERVICE_UNAVAILABLE),
            (SessionError::EmptyRecording, StatusCode::UNPROCESSABLE_ENTITY),
            (
                SessionError::Stage {
                    stage: Stage::Transcription,
                    source: GatewayError::Timeout(Duration::from_secs(30)),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                SessionError::Stage {
                    stage: Stage::Synthesis,
                    source: GatewayError::Provider(ProviderFailure::http(400, "bad")),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                SessionError::InvalidState {
                    action: "stop recording",
                    status: SessionStatus::Idle,
                },
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(session_error(err).status(), expected);
        }
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(auth_error(AuthError::Unavailable).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            auth_error(AuthError::Rejected("INVALID_PASSWORD".to_string())).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_history_limited_to_session_user() {
        assert!(may_read_history("uid-1", "uid-1"));
        assert!(may_read_history("anonymous", "anonymous"));
        assert!(!may_read_history("uid-2", "uid-1"));
        assert!(!may_read_history("uid-1", "anonymous"));
        assert!(!may_read_history("", ""));
    }
}
