//! Cloud provider token exchange implementations.

pub mod aws;
pub mod azure;
pub mod gcp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::jwt::{IdentityTokenSource, JwtError};

/// A single network step of a credential exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// Minting the identity token (KMS signature).
    Mint,
    AwsSts,
    AzureToken,
    GcpSts,
    GcpImpersonation,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hop::Mint => "identity token mint",
            Hop::AwsSts => "AWS STS AssumeRoleWithWebIdentity",
            Hop::AzureToken => "Azure AD token",
            Hop::GcpSts => "GCP STS token exchange",
            Hop::GcpImpersonation => "GCP service account impersonation",
        };
        f.write_str(name)
    }
}

/// Why a hop failed.
#[derive(Debug, Error)]
pub enum ExchangeCause {
    #[error("signing failed: {0}")]
    Signing(#[from] JwtError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{hop} failed: {cause}")]
    FederationExchangeFailed {
        hop: Hop,
        #[source]
        cause: ExchangeCause,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    pub fn exchange(hop: Hop, cause: impl Into<ExchangeCause>) -> Self {
        ProviderError::FederationExchangeFailed {
            hop,
            cause: cause.into(),
        }
    }

    pub fn malformed(hop: Hop, detail: impl fmt::Display) -> Self {
        Self::exchange(hop, ExchangeCause::MalformedResponse(detail.to_string()))
    }

    /// The hop that failed, if the error came from an exchange.
    pub fn hop(&self) -> Option<Hop> {
        match self {
            ProviderError::FederationExchangeFailed { hop, .. } => Some(*hop),
            ProviderError::InvalidConfig(_) => None,
        }
    }

    /// HTTP status returned by the failing hop, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::FederationExchangeFailed {
                cause: ExchangeCause::Status { status, .. },
                ..
            } => Some(*status),
            _ => None,
        }
    }
}

/// Cloud credentials with expiration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum CloudCredentials {
    Aws(aws::AwsCredentials),
    Gcp(gcp::GcpCredentials),
    Azure(azure::AzureCredentials),
}

impl CloudCredentials {
    pub fn expires_at(&self) -> DateTime<Utc> {
        match self {
            CloudCredentials::Aws(creds) => creds.expiration,
            CloudCredentials::Gcp(creds) => creds.expires_at,
            CloudCredentials::Azure(creds) => creds.expires_at,
        }
    }

    /// Check if credentials are expired or about to expire.
    pub fn is_expired(&self) -> bool {
        Utc::now() + chrono::Duration::minutes(5) > self.expires_at()
    }
}

/// Token exchange provider trait.
#[async_trait]
pub trait TokenExchangeProvider: Send + Sync {
    /// `aud` claim the cloud expects on the identity token.
    fn audience(&self) -> &str;

    /// Exchange an OIDC token for cloud credentials.
    async fn exchange(&self, oidc_token: &str) -> Result<CloudCredentials, ProviderError>;
}

/// Mints a fresh identity token and trades it for cloud credentials.
///
/// Nothing is cached: every call signs a new token and redoes every hop.
#[derive(Clone)]
pub struct CredentialBroker {
    tokens: Arc<dyn IdentityTokenSource>,
    timeout: Duration,
}

impl CredentialBroker {
    pub fn new(tokens: Arc<dyn IdentityTokenSource>, timeout: Duration) -> Self {
        Self { tokens, timeout }
    }

    pub async fn acquire(
        &self,
        provider: &dyn TokenExchangeProvider,
    ) -> Result<CloudCredentials, ProviderError> {
        let audience = provider.audience();
        debug!(audience, "Requesting identity token");

        let token = with_deadline(Hop::Mint, self.timeout, self.tokens.identity_token(audience))
            .await?
            .map_err(|e| ProviderError::exchange(Hop::Mint, e))?;

        provider.exchange(&token).await
    }
}

async fn with_deadline<F: Future>(hop: Hop, timeout: Duration, fut: F) -> Result<F::Output, ProviderError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ProviderError::exchange(hop, ExchangeCause::Timeout(timeout)))
}

/// Send `request` under a deadline, rejecting non-2xx responses.
pub(crate) async fn send(
    hop: Hop,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, ProviderError> {
    let response = with_deadline(hop, timeout, request.send())
        .await?
        .map_err(|e| ProviderError::exchange(hop, e))?;

    let status = response.status();
    if !status.is_success() {
        // The status is the error; an unreadable body must not replace it.
        let body = tokio::time::timeout(timeout, response.text())
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();
        return Err(ProviderError::exchange(
            hop,
            ExchangeCause::Status {
                status: status.as_u16(),
                body,
            },
        ));
    }

    Ok(response)
}

/// Read and parse a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    hop: Hop,
    response: reqwest::Response,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let body = with_deadline(hop, timeout, response.bytes())
        .await?
        .map_err(|e| ProviderError::exchange(hop, e))?;

    serde_json::from_slice(&body).map_err(|e| ProviderError::malformed(hop, e))
}

pub(crate) fn require(value: &str, name: &str) -> Result<(), ProviderError> {
    if value.trim().is_empty() {
        return Err(ProviderError::InvalidConfig(format!("{} is not set", name)));
    }
    Ok(())
}
