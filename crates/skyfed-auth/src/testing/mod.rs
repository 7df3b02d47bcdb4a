//! In-memory signer for tests.

use async_trait::async_trait;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};

use crate::jwt::JwtError;
use crate::signer::{Signer, SigningKey};

/// Fixed 2048-bit test key (PKCS#8 PEM).
pub const TEST_KEY_PEM: &str = include_str!("test_key.pem");

/// Signs with a local RSA private key, mirroring what KMS does remotely.
pub struct LocalSigner {
    private_key: RsaPrivateKey,
    key: SigningKey,
}

impl LocalSigner {
    pub fn new(private_key: RsaPrivateKey, key_id: impl Into<String>) -> Self {
        let key_id = key_id.into();
        let key = SigningKey::new(key_id.clone(), key_id, private_key.to_public_key());
        Self { private_key, key }
    }

    /// Signer over [`TEST_KEY_PEM`].
    pub fn test_key(key_id: impl Into<String>) -> Self {
        let private_key = RsaPrivateKey::from_pkcs8_pem(TEST_KEY_PEM).expect("test key is valid PKCS#8");
        Self::new(private_key, key_id)
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn key(&self) -> &SigningKey {
        &self.key
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JwtError> {
        let digest = Sha256::digest(message);
        self.private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| JwtError::SigningFailed(e.to_string()))
    }
}

/// Signer that always fails, for error-path tests.
pub struct FailingSigner {
    key: SigningKey,
}

impl FailingSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl Signer for FailingSigner {
    fn key(&self) -> &SigningKey {
        &self.key
    }

    async fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, JwtError> {
        Err(JwtError::SigningFailed("AccessDeniedException: key is disabled".to_string()))
    }
}
