//! OIDC discovery and JWKS publisher for Skyfed.
//!
//! Serves `/{tenant}/.well-known/openid-configuration` and
//! `/{tenant}/.well-known/jwks` for the single KMS signing key.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application with middleware applied.
pub fn build_app(state: Arc<AppState>) -> Router {
    routes::create_router(state)
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr()?, kid = %state.signing_key.key_id, "OIDC publisher listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler, run until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
