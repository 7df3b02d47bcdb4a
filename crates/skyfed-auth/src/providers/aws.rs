//! AWS STS token exchange.

use super::{CloudCredentials, Hop, ProviderError, TokenExchangeProvider, read_json, require, send};
use crate::config::AwsSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Audience AWS STS expects on web identity tokens.
pub const AWS_AUDIENCE: &str = "sts.amazonaws.com";

/// AWS credentials from STS AssumeRoleWithWebIdentity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
    pub region: String,
}

/// AWS STS token exchange provider.
pub struct AwsProvider {
    config: AwsSettings,
    client: reqwest::Client,
    timeout: Duration,
}

impl AwsProvider {
    pub fn new(config: AwsSettings, timeout: Duration) -> Result<Self, ProviderError> {
        require(&config.role_arn, "aws.role_arn")?;
        Ok(Self {
            config,
            client: reqwest::Client::new(),
            timeout,
        })
    }

    fn sts_endpoint(&self) -> String {
        match &self.config.sts_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://sts.{}.amazonaws.com", self.config.region),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StsResponse {
    #[serde(rename = "AssumeRoleWithWebIdentityResponse")]
    response: AssumeRoleWithWebIdentityResponse,
}

#[derive(Debug, Deserialize)]
struct AssumeRoleWithWebIdentityResponse {
    #[serde(rename = "AssumeRoleWithWebIdentityResult")]
    result: AssumeRoleWithWebIdentityResult,
}

#[derive(Debug, Deserialize)]
struct AssumeRoleWithWebIdentityResult {
    #[serde(rename = "Credentials")]
    credentials: StsCredentials,
}

#[derive(Debug, Deserialize)]
struct StsCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "SessionToken")]
    session_token: String,
    #[serde(rename = "Expiration")]
    expiration: StsExpiration,
}

/// The JSON protocol reports epoch seconds; older documents use RFC 3339.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StsExpiration {
    Epoch(f64),
    Timestamp(String),
}

impl StsExpiration {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            StsExpiration::Epoch(secs) => DateTime::from_timestamp(*secs as i64, 0),
            StsExpiration::Timestamp(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok(),
        }
    }
}

#[async_trait]
impl TokenExchangeProvider for AwsProvider {
    fn audience(&self) -> &str {
        AWS_AUDIENCE
    }

    async fn exchange(&self, oidc_token: &str) -> Result<CloudCredentials, ProviderError> {
        debug!(role_arn = %self.config.role_arn, "Exchanging OIDC token for AWS credentials");

        let duration = self.config.duration_seconds.to_string();
        let params = [
            ("Action", "AssumeRoleWithWebIdentity"),
            ("Version", "2011-06-15"),
            ("RoleArn", self.config.role_arn.as_str()),
            ("RoleSessionName", self.config.session_name.as_str()),
            ("WebIdentityToken", oidc_token),
            ("DurationSeconds", duration.as_str()),
        ];

        let request = self
            .client
            .post(self.sts_endpoint())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params);

        let response = send(Hop::AwsSts, request, self.timeout).await?;
        let sts_response: StsResponse = read_json(Hop::AwsSts, response, self.timeout).await?;

        let creds = sts_response.response.result.credentials;
        let expiration = creds.expiration.to_datetime().ok_or_else(|| {
            ProviderError::malformed(Hop::AwsSts, format!("invalid Expiration {:?}", creds.expiration))
        })?;

        Ok(CloudCredentials::Aws(AwsCredentials {
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: creds.session_token,
            expiration,
            region: self.config.region.clone(),
        }))
    }
}
