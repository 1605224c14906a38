//! # Signer Errors

use thiserror::Error;

/// Errors raised while loading keys or signing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// Private key material is malformed or out of range.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// The mnemonic phrase cannot be used for derivation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A derived child key fell outside the curve order.
    #[error("key derivation failed at path segment {0}")]
    Derivation(u32),

    /// The key file could not be read.
    #[error("cannot read key file: {0}")]
    KeyFile(String),

    /// A DER signature or SPKI public key is malformed.
    #[error("malformed DER: {0}")]
    Der(String),

    /// Neither recovery id reproduces the known public key.
    #[error("signature_unrecoverable: no recovery id matches the signer public key")]
    SignatureUnrecoverable,

    /// k256 rejected a signing operation.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The KMS request failed or returned an unexpected body.
    #[error("kms error: {0}")]
    Kms(String),

    /// Credentials for the KMS are missing.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

impl SignerError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            SignerError::InvalidKey(_) => "invalid_key",
            SignerError::InvalidMnemonic(_) => "invalid_mnemonic",
            SignerError::Derivation(_) => "key_derivation",
            SignerError::KeyFile(_) => "key_file",
            SignerError::Der(_) => "malformed_der",
            SignerError::SignatureUnrecoverable => "signature_unrecoverable",
            SignerError::Signing(_) => "signing",
            SignerError::Kms(_) => "kms",
            SignerError::MissingCredential(_) => "missing_credential",
        }
    }
}

impl From<reqwest::Error> for SignerError {
    fn from(e: reqwest::Error) -> Self {
        SignerError::Kms(e.to_string())
    }
}
