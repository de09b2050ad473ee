//! HTTP API server for driving the companion from a browser client
//!
//! This module provides a REST API over the session and store:
//! - POST /session/record/start, /session/record/stop, /session/reset
//! - GET /session/status
//! - POST /emotion/frame - Upload a camera frame for emotion sampling
//! - GET /emotion/trend - Current emotion trend and face presence
//! - GET /conversations/:user_id - Stored history of the current session user
//! - POST /auth/login, /auth/register, /auth/logout
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
