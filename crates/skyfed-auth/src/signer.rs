//! Remote RSA signing backed by AWS KMS.
//!
//! The private half of the key stays in KMS. Only the public key is fetched,
//! once, when the signer is created.

use async_trait::async_trait;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{MessageType, SigningAlgorithmSpec};
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::KmsSettings;
use crate::jwt::JwtError;

/// The single active signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    /// Identifier passed to KMS.
    pub key_handle: String,
    /// Published as `kid`.
    pub key_id: String,
    pub public_key: RsaPublicKey,
}

impl SigningKey {
    pub fn new(key_handle: impl Into<String>, key_id: impl Into<String>, public_key: RsaPublicKey) -> Self {
        Self {
            key_handle: key_handle.into(),
            key_id: key_id.into(),
            public_key,
        }
    }

    /// Modulus as unsigned big-endian bytes.
    pub fn modulus_bytes(&self) -> Vec<u8> {
        self.public_key.n().to_bytes_be()
    }

    /// Public exponent as unsigned big-endian bytes.
    pub fn exponent_bytes(&self) -> Vec<u8> {
        self.public_key.e().to_bytes_be()
    }

    /// JWK `alg`, derived from the modulus size in bytes (`RS256` for 2048-bit keys).
    ///
    /// Only 2048-bit keys are accepted by [`KmsSigner::connect`], so the published value
    /// always agrees with the `RS256` written into token headers.
    pub fn algorithm(&self) -> String {
        format!("RS{}", self.public_key.size())
    }

    /// Reject keys whose JWK `alg` would disagree with the RS256 token header.
    pub fn ensure_rs256(&self) -> Result<(), JwtError> {
        if self.algorithm() != "RS256" {
            return Err(JwtError::KeyUnavailable(format!(
                "expected a 2048-bit RSA key, got {} bits",
                self.public_key.size() * 8
            )));
        }
        Ok(())
    }
}

/// Produces RS256 signatures for JWT signing inputs.
///
/// There is no verify operation; relying parties verify against the published JWKS.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The key whose private half produces the signatures.
    fn key(&self) -> &SigningKey;

    /// Sign `message` with RSASSA-PKCS1-v1_5 over its SHA-256 digest.
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JwtError>;
}

/// Build a KMS client from the default AWS credential chain.
pub async fn kms_client(settings: &KmsSettings) -> aws_sdk_kms::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &settings.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    if let Some(profile) = &settings.profile {
        loader = loader.profile_name(profile);
    }

    aws_sdk_kms::Client::new(&loader.load().await)
}

/// Signer delegating the private-key operation to AWS KMS.
pub struct KmsSigner {
    client: aws_sdk_kms::Client,
    key: SigningKey,
}

impl KmsSigner {
    /// Fetch the public half of `key_handle` and build a signer for it.
    ///
    /// Fails with [`JwtError::KeyUnavailable`]; callers must not start serving without a key.
    pub async fn connect(
        client: aws_sdk_kms::Client,
        key_handle: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Result<Self, JwtError> {
        let key_handle = key_handle.into();

        let output = client
            .get_public_key()
            .key_id(&key_handle)
            .send()
            .await
            .map_err(|e| JwtError::KeyUnavailable(DisplayErrorContext(&e).to_string()))?;

        let der = output
            .public_key()
            .ok_or_else(|| JwtError::KeyUnavailable("KMS returned no public key".to_string()))?;

        let public_key = RsaPublicKey::from_public_key_der(der.as_ref())
            .map_err(|e| JwtError::KeyUnavailable(format!("not an RSA public key: {}", e)))?;

        let key = SigningKey::new(key_handle, key_id, public_key);
        key.ensure_rs256()?;
        info!(
            key_handle = %key.key_handle,
            kid = %key.key_id,
            bits = key.public_key.size() * 8,
            "Loaded KMS signing key"
        );

        Ok(Self { client, key })
    }
}

#[async_trait]
impl Signer for KmsSigner {
    fn key(&self) -> &SigningKey {
        &self.key
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JwtError> {
        let digest = Sha256::digest(message);
        debug!(key_handle = %self.key.key_handle, "Requesting KMS signature");

        let output = self
            .client
            .sign()
            .key_id(&self.key.key_handle)
            .message(Blob::new(digest.to_vec()))
            .message_type(MessageType::Digest)
            .signing_algorithm(SigningAlgorithmSpec::RsassaPkcs1V15Sha256)
            .send()
            .await
            .map_err(|e| JwtError::SigningFailed(DisplayErrorContext(&e).to_string()))?;

        let signature = output
            .signature()
            .ok_or_else(|| JwtError::SigningFailed("KMS returned no signature".to_string()))?;

        Ok(signature.as_ref().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LocalSigner;
    use aws_sdk_kms::config::{BehaviorVersion, Credentials, Region, retry::RetryConfig};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use rsa::BigUint;
    use rsa::pkcs8::EncodePublicKey;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_HANDLE: &str = "arn:aws:kms:us-east-1:123456789012:key/test";
    const AMZ_JSON: &str = "application/x-amz-json-1.1";

    fn client(server: &MockServer) -> aws_sdk_kms::Client {
        let config = aws_sdk_kms::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .endpoint_url(server.uri())
            .build();
        aws_sdk_kms::Client::from_conf(config)
    }

    fn kms_json(body: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), AMZ_JSON)
    }

    fn kms_error(kind: &str) -> ResponseTemplate {
        ResponseTemplate::new(400).set_body_raw(
            serde_json::json!({"__type": kind, "message": "rejected"}).to_string(),
            AMZ_JSON,
        )
    }

    async fn mount_public_key(server: &MockServer, public_key: &RsaPublicKey) {
        let der = public_key.to_public_key_der().unwrap();
        Mock::given(method("POST"))
            .and(header("x-amz-target", "TrentService.GetPublicKey"))
            .respond_with(kms_json(serde_json::json!({
                "KeyId": KEY_HANDLE,
                "KeySpec": "RSA_2048",
                "PublicKey": STANDARD.encode(der.as_bytes())
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_connect_loads_public_key() {
        let server = MockServer::start().await;
        let local = LocalSigner::test_key("kid-1");
        mount_public_key(&server, &local.key().public_key).await;

        let signer = KmsSigner::connect(client(&server), KEY_HANDLE, "kid-1").await.unwrap();
        assert_eq!(signer.key().key_handle, KEY_HANDLE);
        assert_eq!(signer.key().key_id, "kid-1");
        assert_eq!(signer.key().public_key, local.key().public_key);
        assert_eq!(signer.key().algorithm(), "RS256");
    }

    #[tokio::test]
    async fn test_sign_sends_sha256_digest() {
        let server = MockServer::start().await;
        let local = LocalSigner::test_key("kid-1");
        mount_public_key(&server, &local.key().public_key).await;

        let message = b"header.payload";
        let expected = local.sign(message).await.unwrap();
        Mock::given(method("POST"))
            .and(header("x-amz-target", "TrentService.Sign"))
            .and(body_partial_json(serde_json::json!({
                "KeyId": KEY_HANDLE,
                "Message": STANDARD.encode(Sha256::digest(message)),
                "MessageType": "DIGEST",
                "SigningAlgorithm": "RSASSA_PKCS1_V1_5_SHA_256"
            })))
            .respond_with(kms_json(serde_json::json!({
                "KeyId": KEY_HANDLE,
                "Signature": STANDARD.encode(&expected),
                "SigningAlgorithm": "RSASSA_PKCS1_V1_5_SHA_256"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let signer = KmsSigner::connect(client(&server), KEY_HANDLE, "kid-1").await.unwrap();
        assert_eq!(signer.sign(message).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_sign_error_is_signing_failed() {
        let server = MockServer::start().await;
        let local = LocalSigner::test_key("kid-1");
        mount_public_key(&server, &local.key().public_key).await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "TrentService.Sign"))
            .respond_with(kms_error("KMSInvalidStateException"))
            .mount(&server)
            .await;

        let signer = KmsSigner::connect(client(&server), KEY_HANDLE, "kid-1").await.unwrap();
        let err = signer.sign(b"header.payload").await.unwrap_err();
        assert!(matches!(err, JwtError::SigningFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "TrentService.GetPublicKey"))
            .respond_with(kms_error("NotFoundException"))
            .mount(&server)
            .await;

        let err = KmsSigner::connect(client(&server), KEY_HANDLE, "kid-1").await.err().unwrap();
        assert!(matches!(err, JwtError::KeyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unusable_public_key_is_unavailable() {
        let bodies = [
            serde_json::json!({"KeyId": KEY_HANDLE}),
            serde_json::json!({"KeyId": KEY_HANDLE, "PublicKey": STANDARD.encode(b"not der")}),
        ];
        for body in bodies {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(header("x-amz-target", "TrentService.GetPublicKey"))
                .respond_with(kms_json(body))
                .mount(&server)
                .await;

            let err = KmsSigner::connect(client(&server), KEY_HANDLE, "kid-1").await.err().unwrap();
            assert!(matches!(err, JwtError::KeyUnavailable(_)));
        }
    }

    #[tokio::test]
    async fn test_larger_keys_are_rejected() {
        let public_key = RsaPublicKey::new(BigUint::from_bytes_be(&[0xff; 384]), BigUint::from(65537u32)).unwrap();
        let key = SigningKey::new(KEY_HANDLE, "kid-1", public_key.clone());
        assert_eq!(key.algorithm(), "RS384");
        assert!(matches!(key.ensure_rs256(), Err(JwtError::KeyUnavailable(_))));

        let server = MockServer::start().await;
        mount_public_key(&server, &public_key).await;
        let err = KmsSigner::connect(client(&server), KEY_HANDLE, "kid-1").await.err().unwrap();
        assert!(err.to_string().contains("3072 bits"));
    }
}
