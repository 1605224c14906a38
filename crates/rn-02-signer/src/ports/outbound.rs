//! # Outbound Ports (Driven Ports / SPI)
//!
//! The remote key service the signer depends on for KMS-held keys.

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use k256::pkcs8::EncodePublicKey;
use shared_types::Hash;

use crate::domain::errors::SignerError;
use crate::domain::signature::high_s_twin;

/// A key service holding secp256k1 keys it never exports.
///
/// Both calls return DER exactly as the service sends it; normalization
/// happens in the domain layer.
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// DER `SubjectPublicKeyInfo` for `key_id`.
    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>, SignerError>;

    /// DER `(r, s)` over a 32-byte digest, without recovery id.
    async fn sign_digest(&self, key_id: &str, digest: &Hash) -> Result<Vec<u8>, SignerError>;
}

/// In-process KMS holding one key.
///
/// Signatures come back with high `s`, like a real HSM may return them.
pub struct MockKmsClient {
    key_id: String,
    key: SigningKey,
}

impl MockKmsClient {
    pub fn new(key_id: impl Into<String>, key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            key,
        }
    }

    fn check_key_id(&self, key_id: &str) -> Result<(), SignerError> {
        if key_id == self.key_id {
            Ok(())
        } else {
            Err(SignerError::Kms(format!("NotFoundException: key {key_id}")))
        }
    }
}

#[async_trait]
impl KmsClient for MockKmsClient {
    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>, SignerError> {
        self.check_key_id(key_id)?;
        let spki = self
            .key
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| SignerError::Kms(e.to_string()))?;
        Ok(spki.as_bytes().to_vec())
    }

    async fn sign_digest(&self, key_id: &str, digest: &Hash) -> Result<Vec<u8>, SignerError> {
        self.check_key_id(key_id)?;
        let (signature, _) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(high_s_twin(&signature)?.to_der().as_bytes().to_vec())
    }
}
