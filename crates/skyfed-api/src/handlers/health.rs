//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Key currently published in the JWKS.
    pub kid: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        kid: state.signing_key.key_id.clone(),
    })
}

/// The signing key is loaded before the listener binds, so a running server is ready.
pub async fn ready() -> StatusCode {
    StatusCode::OK
}
