//! # Shared Crypto
//!
//! Hashing primitives the rollup claim depends on.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | Keccak-256 | Output leaves, claim hashes, event topics |
//! | `merkle` | Fixed-height binary Merkle tree | Output proofs and epoch roots |
//!
//! ## Padding Convention
//!
//! Missing leaves are the 32-byte zero word. Missing subtrees of height `h`
//! hash to `zero[h]`, where `zero[0] = 0x00..00` and
//! `zero[h + 1] = keccak(zero[h] || zero[h])`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod merkle;

pub use errors::CryptoError;
pub use hashing::{keccak256, keccak256_concat};
pub use merkle::{compute_root_from_siblings, zero_hashes, MerkleTree, MAX_OUTPUT_TREE_HEIGHT};
