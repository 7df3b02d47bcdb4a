//! JWT minting for OIDC identity tokens.
//!
//! Tokens are assembled locally and signed by a [`Signer`]; the compact form is
//! `base64url(header).base64url(payload).base64url(signature)` without padding.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::signer::Signer;

/// Lifetime of every minted token, in seconds.
pub const TOKEN_VALIDITY_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Claim serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Claims supplied by the caller of [`TokenMinter::mint`].
///
/// `iss`, `iat` and `exp` may be present but are always replaced by the minter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(self, subject: impl Into<String>) -> Self {
        self.claim("sub", subject.into())
    }

    pub fn audience(self, audience: impl Into<String>) -> Self {
        self.claim("aud", audience.into())
    }

    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// JOSE header of minted tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub kid: String,
    pub typ: String,
}

impl JwtHeader {
    pub fn rs256(kid: impl Into<String>) -> Self {
        Self {
            alg: "RS256".to_string(),
            kid: kid.into(),
            typ: "JWT".to_string(),
        }
    }
}

/// A signed token and the expiry written into its `exp` claim.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Assembles and signs identity tokens for a fixed issuer.
pub struct TokenMinter {
    signer: Arc<dyn Signer>,
    issuer: String,
}

impl TokenMinter {
    pub fn new(signer: Arc<dyn Signer>, issuer: impl Into<String>) -> Self {
        Self {
            signer,
            issuer: issuer.into(),
        }
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    /// Mint a token carrying `claims`.
    pub async fn mint(&self, claims: ClaimSet) -> Result<MintedToken, JwtError> {
        // Whole seconds so the returned expiry matches the `exp` claim exactly.
        let issued_at = Utc::now().timestamp();
        let expires_at = DateTime::from_timestamp(issued_at, 0)
            .unwrap_or_else(Utc::now)
            + Duration::seconds(TOKEN_VALIDITY_SECS);

        let mut payload = claims.into_inner();
        payload.insert("iss".to_string(), Value::String(self.issuer.clone()));
        payload.insert("iat".to_string(), Value::from(issued_at));
        payload.insert("exp".to_string(), Value::from(expires_at.timestamp()));

        let header = JwtHeader::rs256(self.signer.key().key_id.clone());
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?)
        );

        let signature = self.signer.sign(signing_input.as_bytes()).await?;

        debug!(
            kid = %header.kid,
            aud = ?payload.get("aud"),
            exp = expires_at.timestamp(),
            "Minted identity token"
        );

        Ok(MintedToken {
            token: format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)),
            expires_at,
        })
    }
}

/// Supplies fresh identity tokens for a given audience.
///
/// Implementations must be stateless: credential libraries may call this any
/// number of times over the life of the process.
#[async_trait]
pub trait IdentityTokenSource: Send + Sync {
    async fn identity_token(&self, audience: &str) -> Result<String, JwtError>;
}

/// Mints `{sub, aud}` tokens for a fixed subject.
pub struct SubjectTokenSource {
    minter: Arc<TokenMinter>,
    subject: String,
}

impl SubjectTokenSource {
    pub fn new(minter: Arc<TokenMinter>, subject: impl Into<String>) -> Self {
        Self {
            minter,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl IdentityTokenSource for SubjectTokenSource {
    async fn identity_token(&self, audience: &str) -> Result<String, JwtError> {
        let claims = ClaimSet::new().subject(self.subject.clone()).audience(audience);
        Ok(self.minter.mint(claims).await?.token)
    }
}

/// OIDC token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(token: String, expires_at: DateTime<Utc>) -> Self {
        let expires_in = (expires_at - Utc::now()).num_seconds();
        Self {
            token,
            token_type: "Bearer".to_string(),
            expires_at,
            expires_in,
        }
    }
}

impl From<MintedToken> for TokenResponse {
    fn from(minted: MintedToken) -> Self {
        Self::new(minted.token, minted.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::Jwk;
    use crate::testing::{FailingSigner, LocalSigner};
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};

    const ISSUER: &str = "https://idp.example.com/acme";

    fn minter() -> TokenMinter {
        TokenMinter::new(Arc::new(LocalSigner::test_key("test-kid")), ISSUER)
    }

    fn decode_segment(segment: &str) -> Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_mint_sets_header_and_claims() {
        let minted = minter()
            .mint(ClaimSet::new().subject("example-sub").audience("sts.amazonaws.com"))
            .await
            .unwrap();

        let parts: Vec<&str> = minted.token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: JwtHeader = serde_json::from_value(decode_segment(parts[0])).unwrap();
        assert_eq!(header, JwtHeader::rs256("test-kid"));

        let payload = decode_segment(parts[1]);
        assert_eq!(payload["iss"], ISSUER);
        assert_eq!(payload["sub"], "example-sub");
        assert_eq!(payload["aud"], "sts.amazonaws.com");

        let iat = payload["iat"].as_i64().unwrap();
        let exp = payload["exp"].as_i64().unwrap();
        assert_eq!(exp - iat, 3600);
        assert_eq!(minted.expires_at.timestamp(), exp);
    }

    #[tokio::test]
    async fn test_minter_claims_override_caller_claims() {
        let forged = ClaimSet::new()
            .claim("iss", "https://evil.example.com")
            .claim("iat", 1)
            .claim("exp", 4_102_444_800_i64)
            .audience("api://AzureADTokenExchange");

        let minted = minter().mint(forged).await.unwrap();
        let payload = decode_segment(minted.token.split('.').nth(1).unwrap());

        assert_eq!(payload["iss"], ISSUER);
        assert_ne!(payload["iat"], 1);
        assert_eq!(payload["exp"].as_i64().unwrap() - payload["iat"].as_i64().unwrap(), 3600);
        assert_eq!(payload["aud"], "api://AzureADTokenExchange");
    }

    #[tokio::test]
    async fn test_nested_claims_survive_encoding() {
        let claims = ClaimSet::new()
            .subject("workload")
            .claim("ctx", serde_json::json!({"env": "prod", "replicas": [1, 2]}));

        let minted = minter().mint(claims).await.unwrap();
        let payload = decode_segment(minted.token.split('.').nth(1).unwrap());
        assert_eq!(payload["ctx"]["env"], "prod");
        assert_eq!(payload["ctx"]["replicas"][1], 2);
    }

    #[tokio::test]
    async fn test_minted_token_verifies_against_published_jwk() {
        let minter = minter();
        let jwk = Jwk::from_signing_key(minter.signer().key());

        let minted = minter
            .mint(ClaimSet::new().subject("example-sub").audience("sts.amazonaws.com"))
            .await
            .unwrap();

        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&["sts.amazonaws.com"]);

        let data = jsonwebtoken::decode::<Value>(&minted.token, &key, &validation).unwrap();
        assert_eq!(data.claims["sub"], "example-sub");
        assert_eq!(data.header.kid.as_deref(), Some("test-kid"));
    }

    #[tokio::test]
    async fn test_signing_failure_produces_no_token() {
        let key = LocalSigner::test_key("test-kid").key().clone();
        let minter = TokenMinter::new(Arc::new(FailingSigner::new(key)), ISSUER);

        let err = minter.mint(ClaimSet::new().subject("example-sub")).await.unwrap_err();
        assert!(matches!(err, JwtError::SigningFailed(_)));
    }

    #[tokio::test]
    async fn test_subject_token_source_sets_audience() {
        let source = SubjectTokenSource::new(Arc::new(minter()), "example-sub");

        let token = source.identity_token("sts.amazonaws.com").await.unwrap();
        let payload = decode_segment(token.split('.').nth(1).unwrap());
        assert_eq!(payload["sub"], "example-sub");
        assert_eq!(payload["aud"], "sts.amazonaws.com");
    }

    #[test]
    fn test_token_response_from_minted() {
        let expires_at = Utc::now() + Duration::seconds(TOKEN_VALIDITY_SECS);
        let response = TokenResponse::from(MintedToken {
            token: "a.b.c".to_string(),
            expires_at,
        });

        assert_eq!(response.token_type, "Bearer");
        assert!(response.expires_in > 3500 && response.expires_in <= 3600);
    }
}
