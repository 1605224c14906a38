//! # Signature Normalization (secp256k1)
//!
//! Remote signers return a DER `(r, s)` pair with no recovery byte and no
//! guarantee that `s` is low. Ethereum needs both, so a KMS signature goes
//! through:
//!
//! 1. DER decode
//! 2. EIP-2 low-s clamp: `s > n/2` becomes `n - s`
//! 3. Recovery id search over `v ∈ {0, 1}` against the known public key

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::pkcs8::DecodePublicKey;
use shared_crypto::keccak256;
use shared_types::{Address, Hash};

use super::errors::SignerError;
use super::transaction::RecoverableSignature;

// =============================================================================
// DER & NORMALIZATION
// =============================================================================

/// Decode a DER `SEQUENCE { INTEGER r, INTEGER s }` and fold `s` into the
/// lower half of the curve order.
pub fn parse_der_signature(der: &[u8]) -> Result<Signature, SignerError> {
    let signature = Signature::from_der(der).map_err(|e| SignerError::Der(e.to_string()))?;
    Ok(signature.normalize_s().unwrap_or(signature))
}

/// The `(r, n - s)` twin of a signature, valid for the same key and digest.
pub fn high_s_twin(signature: &Signature) -> Result<Signature, SignerError> {
    let low = signature.normalize_s().unwrap_or_else(|| signature.clone());
    Signature::from_scalars(low.r(), -low.s()).map_err(|e| SignerError::Signing(e.to_string()))
}

/// Big-endian `(r, s)`.
pub fn split_signature(signature: &Signature) -> ([u8; 32], [u8; 32]) {
    let bytes = signature.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    (r, s)
}

// =============================================================================
// RECOVERY
// =============================================================================

/// The `v ∈ {0, 1}` for which `(r, s, v)` recovers `expected` over `prehash`.
pub fn find_recovery_id(
    prehash: &Hash,
    signature: &Signature,
    expected: &VerifyingKey,
) -> Result<u8, SignerError> {
    for v in 0u8..=1 {
        let Some(recovery_id) = RecoveryId::from_byte(v) else {
            continue;
        };
        match VerifyingKey::recover_from_prehash(prehash, signature, recovery_id) {
            Ok(key) if &key == expected => return Ok(v),
            _ => continue,
        }
    }
    Err(SignerError::SignatureUnrecoverable)
}

/// Turn a KMS DER signature into an Ethereum signature.
pub fn normalize_der_signature(
    prehash: &Hash,
    der: &[u8],
    public_key: &VerifyingKey,
) -> Result<RecoverableSignature, SignerError> {
    let signature = parse_der_signature(der)?;
    let recovery_id = find_recovery_id(prehash, &signature, public_key)?;
    let (r, s) = split_signature(&signature);
    Ok(RecoverableSignature { r, s, recovery_id })
}

// =============================================================================
// KEYS & ADDRESSES
// =============================================================================

/// Ethereum address: last 20 bytes of `keccak(x || y)`.
pub fn address_from_public_key(public_key: &VerifyingKey) -> Address {
    let point = public_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Extract the secp256k1 key from a DER `SubjectPublicKeyInfo`.
pub fn public_key_from_spki(spki: &[u8]) -> Result<VerifyingKey, SignerError> {
    VerifyingKey::from_public_key_der(spki).map_err(|e| SignerError::Der(e.to_string()))
}
