//! Application state shared across handlers.

use skyfed_auth::{FederationConfig, SigningKey};

/// Read-only state shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub signing_key: SigningKey,
    /// Host used when a request carries no `Host` header.
    pub default_host: String,
}

impl AppState {
    pub fn new(signing_key: SigningKey, default_host: impl Into<String>) -> Self {
        Self {
            signing_key,
            default_host: default_host.into(),
        }
    }

    /// State for `signing_key`, falling back to the configured issuer's host.
    pub fn from_config(signing_key: SigningKey, config: &FederationConfig) -> Self {
        let default_host = config.issuer_authority().unwrap_or_default();
        Self::new(signing_key, default_host)
    }
}
