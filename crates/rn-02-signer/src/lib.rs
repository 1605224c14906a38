//! # Signer (rn-02)
//!
//! Signs L1 transactions for the Claimer with one of three key holders:
//!
//! | Variant | Key source | Signing |
//! |---------|------------|---------|
//! | `LocalKey` | hex private key or key file | in-process, k256 |
//! | `Mnemonic` | BIP-39 phrase at `m/44'/60'/0'/0/{i}` | in-process, k256 |
//! | `RemoteKms` | AWS KMS key id | remote DER, normalized locally |
//!
//! All variants produce identical EIP-155 / EIP-1559 encodings for the same
//! key, which the KMS round-trip tests check.
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Transactions, BIP-32 derivation, DER and recovery rules
//! - `ports/` - `KmsClient` and `MockKmsClient`
//! - `adapters/` - AWS KMS over SigV4
//! - `signer` - The `Signer` variant type

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod signer;

pub use adapters::aws_kms::AwsKmsClient;
pub use adapters::sigv4::Credentials;
pub use domain::errors::SignerError;
pub use domain::transaction::{
    Eip1559Transaction, LegacyTransaction, RecoverableSignature, SignedTransaction, Transaction,
};
pub use ports::outbound::{KmsClient, MockKmsClient};
pub use signer::{KmsSigner, Signer};
