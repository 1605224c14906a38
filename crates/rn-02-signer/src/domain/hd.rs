//! # Hierarchical Deterministic Keys
//!
//! BIP-39 seed stretching and BIP-32 private derivation along the Ethereum
//! account path `m/44'/60'/0'/0/{index}`.
//!
//! The mnemonic is checked for shape (word count, lowercase ASCII words) but
//! not against the English wordlist; a typo yields a different, valid key.

use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, Scalar};
use sha2::Sha512;

use super::errors::SignerError;

type HmacSha512 = Hmac<Sha512>;

/// Hardened child offset (2^31).
pub const HARDENED: u32 = 0x8000_0000;

const PBKDF2_ROUNDS: u32 = 2048;
const MASTER_KEY_SALT: &[u8] = b"Bitcoin seed";
const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// `m/44'/60'/0'/0/{account_index}`
pub fn ethereum_account_path(account_index: u32) -> [u32; 5] {
    [44 | HARDENED, 60 | HARDENED, HARDENED, 0, account_index]
}

// =============================================================================
// BIP-39
// =============================================================================

/// Collapse whitespace and check the phrase can be a BIP-39 mnemonic.
pub fn normalize_mnemonic(phrase: &str) -> Result<String, SignerError> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if !VALID_WORD_COUNTS.contains(&words.len()) {
        return Err(SignerError::InvalidMnemonic(format!(
            "expected 12, 15, 18, 21 or 24 words, got {}",
            words.len()
        )));
    }
    if let Some(word) = words
        .iter()
        .find(|w| !w.bytes().all(|b| b.is_ascii_lowercase()))
    {
        return Err(SignerError::InvalidMnemonic(format!(
            "word {word:?} is not lowercase ASCII"
        )));
    }
    Ok(words.join(" "))
}

/// PBKDF2-HMAC-SHA512(mnemonic, "mnemonic" || passphrase, 2048), 64 bytes.
///
/// The output length equals the HMAC width, so only block 1 is computed.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<[u8; 64], SignerError> {
    let mnemonic = normalize_mnemonic(phrase)?;
    let salt = format!("mnemonic{passphrase}");

    let mut block = hmac_sha512(
        mnemonic.as_bytes(),
        &[salt.as_bytes(), &1u32.to_be_bytes()],
    )?;
    let mut seed = block;
    for _ in 1..PBKDF2_ROUNDS {
        block = hmac_sha512(mnemonic.as_bytes(), &[&block])?;
        for (acc, byte) in seed.iter_mut().zip(block.iter()) {
            *acc ^= byte;
        }
    }
    Ok(seed)
}

// =============================================================================
// BIP-32
// =============================================================================

/// A private key with its chain code.
pub struct ExtendedKey {
    key: SigningKey,
    chain_code: [u8; 32],
}

impl ExtendedKey {
    pub fn master(seed: &[u8]) -> Result<Self, SignerError> {
        let digest = hmac_sha512(MASTER_KEY_SALT, &[seed])?;
        let (secret, chain_code) = digest.split_at(32);
        let key = SigningKey::from_slice(secret)
            .map_err(|e| SignerError::InvalidKey(format!("master key: {e}")))?;
        Ok(Self {
            key,
            chain_code: to_array(chain_code),
        })
    }

    /// CKDpriv: derive child `index` (hardened when `index >= 2^31`).
    pub fn child(&self, index: u32) -> Result<Self, SignerError> {
        let parent = self.key.to_bytes();
        let digest = if index >= HARDENED {
            hmac_sha512(&self.chain_code, &[&[0u8], &parent, &index.to_be_bytes()])?
        } else {
            let public = self.key.verifying_key().to_encoded_point(true);
            hmac_sha512(&self.chain_code, &[public.as_bytes(), &index.to_be_bytes()])?
        };
        let (tweak, chain_code) = digest.split_at(32);

        let tweak = scalar_from_bytes(tweak).ok_or(SignerError::Derivation(index))?;
        let parent = scalar_from_bytes(&parent).ok_or(SignerError::Derivation(index))?;
        let child = tweak + parent;
        if child == Scalar::ZERO {
            return Err(SignerError::Derivation(index));
        }

        let key = SigningKey::from_bytes(&child.to_bytes())
            .map_err(|_| SignerError::Derivation(index))?;
        Ok(Self {
            key,
            chain_code: to_array(chain_code),
        })
    }

    pub fn derive_path(self, path: &[u32]) -> Result<Self, SignerError> {
        path.iter().try_fold(self, |node, index| node.child(*index))
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    pub fn into_signing_key(self) -> SigningKey {
        self.key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }
}

/// Key at `m/44'/60'/0'/0/{account_index}` for a mnemonic.
pub fn derive_account_key(
    phrase: &str,
    passphrase: &str,
    account_index: u32,
) -> Result<SigningKey, SignerError> {
    let seed = mnemonic_to_seed(phrase, passphrase)?;
    let node = ExtendedKey::master(&seed)?.derive_path(&ethereum_account_path(account_index))?;
    Ok(node.into_signing_key())
}

// =============================================================================
// HELPERS
// =============================================================================

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 64], SignerError> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| SignerError::InvalidKey(format!("hmac key: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// `None` when the bytes encode a value `>= n`.
fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
}

fn to_array(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}
