//! API route definitions.

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::{health, well_known};
use crate::state::AppState;

/// Create the publisher router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/{tenant}/.well-known/openid-configuration",
            get(well_known::openid_configuration),
        )
        .route("/{tenant}/.well-known/jwks", get(well_known::jwks))
        .with_state(state)
}
