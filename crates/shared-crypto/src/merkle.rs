//! # Fixed-Height Merkle Tree
//!
//! A binary Keccak tree of a fixed height over an append-only list of leaves.
//!
//! ALGORITHM: each parent is `keccak(left || right)`. Only the nodes covering
//! real leaves are materialised; every other subtree of height `h` is the
//! precomputed `zero[h]`. Building is `O(n + height)` in time and memory, so a
//! height-63 tree over a handful of outputs is cheap.
//!
//! Sibling paths are ordered leaf to root, so `siblings[k]` is the co-path
//! node at level `k`. Whether it sits left or right follows from bit `k` of
//! the leaf index.

use shared_types::{Hash, ZERO_HASH};

use crate::errors::CryptoError;
use crate::hashing::keccak256_concat;

/// Height of the output tree every claim is computed over.
pub const MAX_OUTPUT_TREE_HEIGHT: usize = 63;

/// Roots of the all-empty subtrees, `zero[0]..=zero[height]`.
pub fn zero_hashes(height: usize) -> Vec<Hash> {
    let mut ladder = Vec::with_capacity(height + 1);
    ladder.push(ZERO_HASH);
    for level in 0..height {
        let below = ladder[level];
        ladder.push(keccak256_concat(&[&below, &below]));
    }
    ladder
}

/// Recompute the root reached from `leaf` at `index` through `siblings`.
pub fn compute_root_from_siblings(leaf: Hash, index: u64, siblings: &[Hash]) -> Hash {
    siblings
        .iter()
        .enumerate()
        .fold(leaf, |node, (level, sibling)| {
            if (index >> level) & 1 == 0 {
                keccak256_concat(&[&node, sibling])
            } else {
                keccak256_concat(&[sibling, &node])
            }
        })
}

/// A sparse, fixed-height Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    height: usize,
    /// `levels[0]` are the leaves; `levels[height]` holds at most the root.
    levels: Vec<Vec<Hash>>,
    zero: Vec<Hash>,
}

impl MerkleTree {
    /// Build a tree of `height` over `leaves`.
    pub fn build(leaves: Vec<Hash>, height: usize) -> Result<Self, CryptoError> {
        if height == 0 || height > MAX_OUTPUT_TREE_HEIGHT {
            return Err(CryptoError::UnsupportedHeight(height));
        }
        if leaves.len() as u64 > 1u64 << height {
            return Err(CryptoError::TooManyLeaves {
                height,
                leaves: leaves.len(),
            });
        }

        let zero = zero_hashes(height);
        let mut levels = Vec::with_capacity(height + 1);
        levels.push(leaves);

        for level in 0..height {
            let below = &levels[level];
            let parents = below
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&zero[level]);
                    keccak256_concat(&[&pair[0], right])
                })
                .collect();
            levels.push(parents);
        }

        Ok(Self {
            height,
            levels,
            zero,
        })
    }

    /// Tree height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of real leaves.
    pub fn leaf_count(&self) -> u64 {
        self.levels[0].len() as u64
    }

    /// The root hash. An empty tree has root `zero[height]`.
    pub fn root(&self) -> Hash {
        self.levels[self.height]
            .first()
            .copied()
            .unwrap_or(self.zero[self.height])
    }

    /// Sibling path for the leaf at `index`, ordered leaf to root.
    pub fn siblings(&self, index: u64) -> Result<Vec<Hash>, CryptoError> {
        if index >= self.leaf_count() {
            return Err(CryptoError::LeafOutOfRange {
                index,
                count: self.leaf_count(),
            });
        }

        let path = (0..self.height)
            .map(|level| {
                let sibling = ((index >> level) ^ 1) as usize;
                self.levels[level]
                    .get(sibling)
                    .copied()
                    .unwrap_or(self.zero[level])
            })
            .collect();
        Ok(path)
    }
}
