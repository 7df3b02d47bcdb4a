//! Azure AD Workload Identity Federation token exchange.

use super::{CloudCredentials, Hop, ProviderError, TokenExchangeProvider, read_json, require, send};
use crate::config::AzureSettings;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Audience Azure AD expects on federated client assertions.
pub const AZURE_AUDIENCE: &str = "api://AzureADTokenExchange";

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Azure credentials from Workload Identity Federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureCredentials {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub tenant_id: String,
}

/// Azure AD Workload Identity Federation token exchange provider.
///
/// The identity token is sent as the client assertion of a client-credentials grant.
pub struct AzureProvider {
    config: AzureSettings,
    client: reqwest::Client,
    timeout: std::time::Duration,
}

impl AzureProvider {
    pub fn new(config: AzureSettings, timeout: std::time::Duration) -> Result<Self, ProviderError> {
        require(&config.tenant_id, "azure.tenant_id")?;
        require(&config.client_id, "azure.client_id")?;
        Ok(Self {
            config,
            client: reqwest::Client::new(),
            timeout,
        })
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_host.trim_end_matches('/'),
            self.config.tenant_id
        )
    }
}

#[derive(Debug, Deserialize)]
struct AzureTokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn expiry_from_now(expires_in: i64) -> Option<DateTime<Utc>> {
    if expires_in < 0 {
        return None;
    }
    Utc::now().checked_add_signed(Duration::try_seconds(expires_in)?)
}

#[async_trait]
impl TokenExchangeProvider for AzureProvider {
    fn audience(&self) -> &str {
        AZURE_AUDIENCE
    }

    async fn exchange(&self, oidc_token: &str) -> Result<CloudCredentials, ProviderError> {
        debug!(
            client_id = %self.config.client_id,
            tenant_id = %self.config.tenant_id,
            "Exchanging OIDC token for Azure credentials"
        );

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", self.config.scope.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", oidc_token),
            ("grant_type", "client_credentials"),
        ];

        let request = self.client.post(self.token_endpoint()).form(&params);
        let response = send(Hop::AzureToken, request, self.timeout).await?;
        let token_response: AzureTokenResponse =
            read_json(Hop::AzureToken, response, self.timeout).await?;
        let expires_at = expiry_from_now(token_response.expires_in).ok_or_else(|| {
            ProviderError::malformed(
                Hop::AzureToken,
                format!("expires_in out of range: {}", token_response.expires_in),
            )
        })?;

        Ok(CloudCredentials::Azure(AzureCredentials {
            access_token: token_response.access_token,
            token_type: token_response.token_type,
            expires_at,
            tenant_id: self.config.tenant_id.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CredentialBroker;
    use crate::providers::test_support::StaticTokenSource;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(authority: &str) -> AzureSettings {
        AzureSettings {
            tenant_id: "test-tenant".to_string(),
            client_id: "test-client".to_string(),
            authority_host: authority.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_azure_token_endpoint() {
        let provider = AzureProvider::new(settings("https://login.microsoftonline.com/"), std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(
            provider.token_endpoint(),
            "https://login.microsoftonline.com/test-tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_requires_client_id() {
        let mut config = settings("https://login.microsoftonline.com");
        config.client_id.clear();
        assert!(AzureProvider::new(config, std::time::Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_every_acquire_requests_a_fresh_assertion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-tenant/oauth2/v2.0/token"))
            .and(body_string_contains("client_assertion=assertion-jwt"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "arm-token",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = AzureProvider::new(settings(&server.uri()), std::time::Duration::from_secs(5)).unwrap();
        let tokens = StaticTokenSource::new("assertion-jwt");
        let broker = CredentialBroker::new(tokens.clone(), std::time::Duration::from_secs(5));

        broker.acquire(&provider).await.unwrap();
        let creds = broker.acquire(&provider).await.unwrap();

        let CloudCredentials::Azure(azure) = creds else {
            panic!("expected Azure credentials");
        };
        assert_eq!(azure.access_token, "arm-token");
        assert_eq!(azure.tenant_id, "test-tenant");
        assert_eq!(
            tokens.audiences.lock().unwrap().as_slice(),
            ["api://AzureADTokenExchange", "api://AzureADTokenExchange"]
        );
    }

    #[tokio::test]
    async fn test_missing_access_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"expires_in": 10})))
            .mount(&server)
            .await;

        let provider = AzureProvider::new(settings(&server.uri()), std::time::Duration::from_secs(5)).unwrap();
        let err = provider.exchange("assertion-jwt").await.unwrap_err();
        assert_eq!(err.hop(), Some(Hop::AzureToken));
        assert!(err.to_string().contains("malformed response"));
    }

    #[tokio::test]
    async fn test_out_of_range_expires_in_is_malformed() {
        for expires_in in [i64::MAX, -1] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "arm-token",
                    "expires_in": expires_in
                })))
                .mount(&server)
                .await;

            let provider = AzureProvider::new(settings(&server.uri()), std::time::Duration::from_secs(5)).unwrap();
            let err = provider.exchange("assertion-jwt").await.unwrap_err();
            assert!(matches!(
                err,
                ProviderError::FederationExchangeFailed {
                    hop: Hop::AzureToken,
                    cause: crate::providers::ExchangeCause::MalformedResponse(_),
                }
            ));
        }
    }
}
