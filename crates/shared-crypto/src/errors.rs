//! Crypto error types.

use thiserror::Error;

/// Merkle tree construction and proof errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// More leaves than a tree of this height can hold.
    #[error("tree of height {height} cannot hold {leaves} leaves")]
    TooManyLeaves {
        /// Tree height.
        height: usize,
        /// Number of leaves supplied.
        leaves: usize,
    },

    /// Height outside `1..=63`.
    #[error("unsupported tree height {0}")]
    UnsupportedHeight(usize),

    /// Proof requested for a leaf that does not exist.
    #[error("leaf index {index} out of range ({count} leaves)")]
    LeafOutOfRange {
        /// Requested leaf.
        index: u64,
        /// Number of leaves in the tree.
        count: u64,
    },
}
