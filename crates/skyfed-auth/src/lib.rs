//! Keyless workload identity for Skyfed.
//!
//! This crate mints OIDC identity tokens signed by a KMS-held RSA key and
//! exchanges them for short-lived AWS, GCP, and Azure credentials.

pub mod config;
pub mod jwt;
pub mod oidc;
pub mod providers;
pub mod signer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use crate::config::{ConfigError, FederationConfig};
pub use crate::jwt::{
    ClaimSet, IdentityTokenSource, JwtError, JwtHeader, MintedToken, SubjectTokenSource, TokenMinter,
    TokenResponse,
};
pub use crate::oidc::{Jwk, Jwks, OidcDiscoveryDocument, issuer_for};
pub use crate::providers::{
    CloudCredentials, CredentialBroker, ExchangeCause, Hop, ProviderError, TokenExchangeProvider,
    aws::{AwsCredentials, AwsProvider},
    azure::{AzureCredentials, AzureProvider},
    gcp::{GcpCredentials, GcpProvider},
};
pub use crate::signer::{KmsSigner, Signer, SigningKey, kms_client};
