//! GCP Workload Identity Federation token exchange.
//!
//! Two hops: the identity token is traded at STS for a federated access token,
//! which then authorizes `generateAccessToken` on the impersonated service account.
//! A failure at either hop aborts the exchange.

use super::{CloudCredentials, Hop, ProviderError, TokenExchangeProvider, read_json, require, send};
use crate::config::GcpSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// GCP credentials from Workload Identity Federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpCredentials {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// GCP Workload Identity Federation token exchange provider.
pub struct GcpProvider {
    config: GcpSettings,
    client: reqwest::Client,
    timeout: Duration,
}

impl GcpProvider {
    pub fn new(config: GcpSettings, timeout: Duration) -> Result<Self, ProviderError> {
        require(&config.workload_identity_audience, "gcp.workload_identity_audience")?;
        require(&config.service_account_email, "gcp.service_account_email")?;
        Ok(Self {
            config,
            client: reqwest::Client::new(),
            timeout,
        })
    }

    fn impersonation_url(&self) -> String {
        format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.config.iam_credentials_endpoint.trim_end_matches('/'),
            self.config.service_account_email
        )
    }

    /// Hop 1: identity token to federated access token.
    async fn federated_token(&self, oidc_token: &str) -> Result<String, ProviderError> {
        let sts_request = StsTokenRequest {
            grant_type: "urn:ietf:params:oauth:grant-type:token-exchange",
            audience: &self.config.workload_identity_audience,
            scope: CLOUD_PLATFORM_SCOPE,
            requested_token_type: "urn:ietf:params:oauth:token-type:access_token",
            subject_token: oidc_token,
            subject_token_type: "urn:ietf:params:oauth:token-type:jwt",
        };

        let request = self.client.post(&self.config.sts_endpoint).json(&sts_request);
        let response = send(Hop::GcpSts, request, self.timeout).await?;
        let sts_token: StsTokenResponse = read_json(Hop::GcpSts, response, self.timeout).await?;

        if sts_token.access_token.is_empty() {
            return Err(ProviderError::malformed(Hop::GcpSts, "empty access_token"));
        }
        Ok(sts_token.access_token)
    }

    /// Hop 2: federated token to service account access token.
    async fn impersonate(&self, federated_token: &str) -> Result<ImpersonateResponse, ProviderError> {
        let impersonate_request = ImpersonateRequest {
            scope: vec![CLOUD_PLATFORM_SCOPE],
            lifetime: &self.config.token_lifetime,
        };

        let request = self
            .client
            .post(self.impersonation_url())
            .bearer_auth(federated_token)
            .json(&impersonate_request);
        let response = send(Hop::GcpImpersonation, request, self.timeout).await?;

        read_json(Hop::GcpImpersonation, response, self.timeout).await
    }
}

#[derive(Debug, Serialize)]
struct StsTokenRequest<'a> {
    grant_type: &'a str,
    audience: &'a str,
    scope: &'a str,
    requested_token_type: &'a str,
    subject_token: &'a str,
    subject_token_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct StsTokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct ImpersonateRequest<'a> {
    scope: Vec<&'a str>,
    lifetime: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImpersonateResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expireTime")]
    expire_time: String,
}

#[async_trait]
impl TokenExchangeProvider for GcpProvider {
    fn audience(&self) -> &str {
        &self.config.workload_identity_audience
    }

    async fn exchange(&self, oidc_token: &str) -> Result<CloudCredentials, ProviderError> {
        debug!(
            audience = %self.config.workload_identity_audience,
            service_account = %self.config.service_account_email,
            "Exchanging OIDC token for GCP credentials"
        );

        let federated_token = self.federated_token(oidc_token).await?;
        let impersonated = self.impersonate(&federated_token).await?;

        let expires_at = DateTime::parse_from_rfc3339(&impersonated.expire_time)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                ProviderError::malformed(
                    Hop::GcpImpersonation,
                    format!("expireTime {:?}: {}", impersonated.expire_time, e),
                )
            })?;

        Ok(CloudCredentials::Gcp(GcpCredentials {
            access_token: impersonated.access_token,
            token_type: "Bearer".to_string(),
            expires_at,
        }))
    }
}
