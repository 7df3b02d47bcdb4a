//! OIDC discovery and JWKS handlers.
//!
//! Both documents are rebuilt on every request from the immutable signing key.
//! The tenant segment only shapes the returned URLs; it never selects a key.

use axum::{
    extract::State,
    http::{HeaderMap, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use skyfed_auth::{Jwks, OidcDiscoveryDocument};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn openid_configuration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let host = request_host(&headers, &uri, &state);
    let tenant = tenant_segment(uri.path());
    debug!(host, tenant, "Serving discovery document");

    json_response(&OidcDiscoveryDocument::for_tenant(host, tenant))
}

pub async fn jwks(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    json_response(&Jwks::from_signing_key(&state.signing_key))
}

/// `Host` header, else the request-target authority (HTTP/2 `:authority`), else the issuer's host.
fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri, state: &'a AppState) -> &'a str {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or(state.default_host.as_str())
}

/// First path segment, still percent-encoded.
fn tenant_segment(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.split_once('/').map_or(path, |(tenant, _)| tenant)
}

fn json_response<T: Serialize>(document: &T) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(document)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_segment() {
        assert_eq!(tenant_segment("/acme/.well-known/jwks"), "acme");
        assert_eq!(tenant_segment("/team%20blue/.well-known/openid-configuration"), "team%20blue");
        assert_eq!(tenant_segment("/solo"), "solo");
    }
}
