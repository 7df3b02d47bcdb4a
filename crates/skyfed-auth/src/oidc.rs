//! OIDC discovery and JWKS documents.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::signer::SigningKey;

/// Issuer URL published for `tenant` when served from `host`.
///
/// The tenant segment is used verbatim; callers pass it still percent-encoded.
pub fn issuer_for(host: &str, tenant: &str) -> String {
    format!("https://{}/{}", host, tenant)
}

/// OIDC discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcDiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
    pub subject_types_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

impl OidcDiscoveryDocument {
    /// Create a discovery document for an issuer.
    pub fn new(issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        Self {
            jwks_uri: format!("{}/.well-known/jwks", issuer),
            issuer,
            subject_types_supported: vec!["public".to_string()],
            response_types_supported: vec!["id_token".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            scopes_supported: vec!["openid".to_string()],
        }
    }

    pub fn for_tenant(host: &str, tenant: &str) -> Self {
        Self::new(issuer_for(host, tenant))
    }
}

/// JSON Web Key for an RSA signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub alg: String,
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self {
            alg: key.algorithm(),
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            kid: key.key_id.clone(),
            n: URL_SAFE_NO_PAD.encode(key.modulus_bytes()),
            e: URL_SAFE_NO_PAD.encode(key.exponent_bytes()),
        }
    }
}

/// JSON Web Key Set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// The set containing only the active signing key.
    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self {
            keys: vec![Jwk::from_signing_key(key)],
        }
    }
}
