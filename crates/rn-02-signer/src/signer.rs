//! # Signer
//!
//! One tagged type over the three key holders. Local and mnemonic keys sign
//! in-process; the KMS arm signs remotely and then normalizes the returned
//! DER signature.

use std::path::Path;
use std::sync::Arc;

use k256::ecdsa::{SigningKey, VerifyingKey};
use shared_types::{decode_hex, Address, Hash};
use tracing::{debug, info};

use crate::domain::errors::SignerError;
use crate::domain::hd::derive_account_key;
use crate::domain::signature::{
    address_from_public_key, normalize_der_signature, public_key_from_spki, split_signature,
};
use crate::domain::transaction::{RecoverableSignature, SignedTransaction, Transaction};
use crate::ports::outbound::KmsClient;

// =============================================================================
// REMOTE KMS KEY
// =============================================================================

/// A KMS key handle with its public key cached at construction.
pub struct KmsSigner {
    client: Arc<dyn KmsClient>,
    key_id: String,
    public_key: VerifyingKey,
    address: Address,
}

impl KmsSigner {
    pub async fn connect(
        client: Arc<dyn KmsClient>,
        key_id: impl Into<String>,
    ) -> Result<Self, SignerError> {
        let key_id = key_id.into();
        let spki = client.public_key(&key_id).await?;
        let public_key = public_key_from_spki(&spki)?;
        let address = address_from_public_key(&public_key);
        Ok(Self {
            client,
            key_id,
            public_key,
            address,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn sign_digest(&self, digest: &Hash) -> Result<RecoverableSignature, SignerError> {
        let der = self.client.sign_digest(&self.key_id, digest).await?;
        normalize_der_signature(digest, &der, &self.public_key)
    }
}

// =============================================================================
// SIGNER
// =============================================================================

pub enum Signer {
    LocalKey { key: SigningKey },
    Mnemonic { key: SigningKey, account_index: u32 },
    RemoteKms(KmsSigner),
}

impl Signer {
    /// Hex private key, with or without `0x`.
    pub fn from_private_key(hex_key: &str) -> Result<Self, SignerError> {
        let bytes = decode_hex(hex_key.trim())
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| SignerError::InvalidKey("not a valid secp256k1 scalar".into()))?;
        Ok(Signer::LocalKey { key })
    }

    pub fn from_private_key_file(path: &Path) -> Result<Self, SignerError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SignerError::KeyFile(format!("{}: {e}", path.display())))?;
        Self::from_private_key(&contents)
    }

    /// Key at `m/44'/60'/0'/0/{account_index}`, empty passphrase.
    pub fn from_mnemonic(phrase: &str, account_index: u32) -> Result<Self, SignerError> {
        let key = derive_account_key(phrase, "", account_index)?;
        Ok(Signer::Mnemonic { key, account_index })
    }

    pub fn from_mnemonic_file(path: &Path, account_index: u32) -> Result<Self, SignerError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SignerError::KeyFile(format!("{}: {e}", path.display())))?;
        Self::from_mnemonic(&contents, account_index)
    }

    pub async fn remote_kms(
        client: Arc<dyn KmsClient>,
        key_id: impl Into<String>,
    ) -> Result<Self, SignerError> {
        let signer = KmsSigner::connect(client, key_id).await?;
        info!(
            "[rn-02] KMS key {} resolves to 0x{}",
            signer.key_id,
            hex::encode(signer.address)
        );
        Ok(Signer::RemoteKms(signer))
    }

    pub fn address(&self) -> Address {
        match self {
            Signer::LocalKey { key } | Signer::Mnemonic { key, .. } => {
                address_from_public_key(key.verifying_key())
            }
            Signer::RemoteKms(kms) => kms.address,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Signer::LocalKey { .. } => "local_key",
            Signer::Mnemonic { .. } => "mnemonic",
            Signer::RemoteKms(_) => "remote_kms",
        }
    }

    /// Low-s signature over a 32-byte digest, with recovery id.
    pub async fn sign_digest(&self, digest: &Hash) -> Result<RecoverableSignature, SignerError> {
        match self {
            Signer::LocalKey { key } | Signer::Mnemonic { key, .. } => sign_locally(key, digest),
            Signer::RemoteKms(kms) => kms.sign_digest(digest).await,
        }
    }

    pub async fn sign_transaction(
        &self,
        tx: &Transaction,
        chain_id: u64,
    ) -> Result<SignedTransaction, SignerError> {
        let digest = tx.signing_hash(chain_id);
        let signature = self.sign_digest(&digest).await?;
        let signed = tx.encode_signed(chain_id, &signature);
        debug!(
            "[rn-02] Signed nonce {} with {} signer: 0x{}",
            tx.nonce(),
            self.kind(),
            hex::encode(signed.hash)
        );
        Ok(signed)
    }
}

fn sign_locally(key: &SigningKey, digest: &Hash) -> Result<RecoverableSignature, SignerError> {
    // k256 normalizes to low-s and adjusts the recovery id.
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| SignerError::Signing(e.to_string()))?;
    let (r, s) = split_signature(&signature);
    Ok(RecoverableSignature {
        r,
        s,
        recovery_id: recovery_id.to_byte(),
    })
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("Signer");
        out.field("kind", &self.kind())
            .field("address", &format!("0x{}", hex::encode(self.address())));
        match self {
            Signer::Mnemonic { account_index, .. } => {
                out.field("account_index", account_index);
            }
            Signer::RemoteKms(kms) => {
                out.field("key_id", &kms.key_id);
            }
            Signer::LocalKey { .. } => {}
        }
        out.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::LegacyTransaction;
    use crate::ports::outbound::MockKmsClient;
    use primitive_types::U256;

    const EIP155_KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";

    fn eip155_example(nonce: u64) -> Transaction {
        Transaction::Legacy(LegacyTransaction {
            nonce,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: [0x35; 20],
            value: U256::from(1_000_000_000_000_000_000u64),
            data: vec![],
        })
    }

    #[tokio::test]
    async fn test_local_key_eip155_vector() {
        let signer = Signer::from_private_key(EIP155_KEY).unwrap();
        let signed = signer.sign_transaction(&eip155_example(9), 1).await.unwrap();
        assert_eq!(
            hex::encode(&signed.raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[tokio::test]
    async fn test_kms_signature_matches_local() {
        let key = SigningKey::from_slice(&[0x46; 32]).unwrap();
        let client = Arc::new(MockKmsClient::new("alias/claimer", key.clone()));
        let remote = Signer::remote_kms(client, "alias/claimer").await.unwrap();
        let local = Signer::LocalKey { key };
        assert_eq!(remote.address(), local.address());

        for nonce in 0..8 {
            let tx = eip155_example(nonce);
            let from_kms = remote.sign_transaction(&tx, 31337).await.unwrap();
            let from_local = local.sign_transaction(&tx, 31337).await.unwrap();
            assert_eq!(from_kms.hash, from_local.hash);
        }
    }

    #[tokio::test]
    async fn test_unknown_kms_key_fails() {
        let key = SigningKey::from_slice(&[0x46; 32]).unwrap();
        let client = Arc::new(MockKmsClient::new("alias/claimer", key));
        let err = Signer::remote_kms(client, "alias/other").await.unwrap_err();
        assert_eq!(err.error_kind(), "kms");
    }

    #[test]
    fn test_mnemonic_signer_address() {
        let signer = Signer::from_mnemonic(
            "test test test test test test test test test test test junk",
            0,
        )
        .unwrap();
        assert_eq!(
            hex::encode(signer.address()),
            "f39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(signer.kind(), "mnemonic");
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(matches!(
            Signer::from_private_key("0x00"),
            Err(SignerError::InvalidKey(_))
        ));
        assert!(matches!(
            Signer::from_private_key(&format!("0x{}", "00".repeat(32))),
            Err(SignerError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_key_file_is_trimmed() {
        let path = std::env::temp_dir().join(format!("rn-02-key-{}", std::process::id()));
        std::fs::write(&path, format!("{EIP155_KEY}\n")).unwrap();
        let signer = Signer::from_private_key_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(signer.kind(), "local_key");

        let missing = Signer::from_private_key_file(Path::new("/nonexistent/key"));
        assert!(matches!(missing, Err(SignerError::KeyFile(_))));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let signer = Signer::from_private_key(EIP155_KEY).unwrap();
        let debug = format!("{signer:?}");
        assert!(!debug.contains("4646464646"));
        assert!(debug.contains("local_key"));
    }
}
