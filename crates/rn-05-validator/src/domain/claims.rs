//! # Epoch Claims
//!
//! A claim binds two commitments:
//!
//! ```text
//! claim = keccak(outputs_root || machine_hash)
//! ```
//!
//! `outputs_root` is the root of a height-63 tree over the hashes of *every*
//! output the application produced up to the epoch's last block, so a proof
//! issued for any epoch stays valid under the root of that epoch's claim.
//! `machine_hash` is the machine state after the epoch's last input.

use std::collections::HashSet;

use shared_crypto::{keccak256, keccak256_concat, zero_hashes, MerkleTree, MAX_OUTPUT_TREE_HEIGHT};
use shared_types::{Hash, Output};

use crate::domain::errors::ValidatorError;

/// Root of the output tree before any output exists.
pub fn empty_outputs_root() -> Hash {
    zero_hashes(MAX_OUTPUT_TREE_HEIGHT)[MAX_OUTPUT_TREE_HEIGHT]
}

pub fn claim_hash(outputs_root: &Hash, machine_hash: &Hash) -> Hash {
    keccak256_concat(&[outputs_root, machine_hash])
}

/// A computed claim together with the proofs of the epoch's own outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochClaim {
    pub outputs_root: Hash,
    pub claim_hash: Hash,
    /// The epoch's outputs with `hash` and `output_hashes_siblings` set.
    pub proven: Vec<Output>,
}

/// Compute the claim over `cumulative` (all outputs up to the epoch's last
/// block, ordered by index) and prove the outputs in `epoch_outputs`.
pub fn compute_epoch_claim(
    cumulative: &[Output],
    epoch_outputs: &[Output],
    machine_hash: &Hash,
) -> Result<EpochClaim, ValidatorError> {
    let leaves: Vec<Hash> = cumulative
        .iter()
        .map(|output| keccak256(&output.raw_data))
        .collect();
    let tree = MerkleTree::build(leaves, MAX_OUTPUT_TREE_HEIGHT)?;
    let outputs_root = tree.root();

    let own: HashSet<u64> = epoch_outputs.iter().map(|output| output.id).collect();
    let mut proven = Vec::with_capacity(epoch_outputs.len());
    for (position, output) in cumulative.iter().enumerate() {
        if !own.contains(&output.id) {
            continue;
        }
        let siblings = tree.siblings(position as u64)?;
        proven.push(Output {
            hash: Some(keccak256(&output.raw_data)),
            output_hashes_siblings: siblings,
            ..output.clone()
        });
    }

    Ok(EpochClaim {
        claim_hash: claim_hash(&outputs_root, machine_hash),
        outputs_root,
        proven,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::compute_root_from_siblings;

    fn output(id: u64, index: u64, raw: &[u8]) -> Output {
        Output {
            id,
            input_id: 1,
            index,
            raw_data: raw.to_vec(),
            hash: None,
            output_hashes_siblings: Vec::new(),
            transaction_hash: None,
        }
    }

    #[test]
    fn test_empty_root_is_top_of_zero_ladder() {
        let tree = MerkleTree::build(Vec::new(), MAX_OUTPUT_TREE_HEIGHT).unwrap();
        assert_eq!(empty_outputs_root(), tree.root());
    }

    #[test]
    fn test_only_epoch_outputs_are_proven() {
        let earlier = output(10, 0, b"first");
        let own = vec![output(11, 1, b"second"), output(12, 2, b"third")];
        let cumulative = vec![earlier, own[0].clone(), own[1].clone()];

        let claim = compute_epoch_claim(&cumulative, &own, &[0x42; 32]).unwrap();

        assert_eq!(claim.proven.len(), 2);
        assert_eq!(claim.claim_hash, claim_hash(&claim.outputs_root, &[0x42; 32]));
        for proven in &claim.proven {
            let leaf = proven.hash.unwrap();
            assert_eq!(leaf, keccak256(&proven.raw_data));
            assert_eq!(proven.output_hashes_siblings.len(), MAX_OUTPUT_TREE_HEIGHT);
            assert_eq!(
                compute_root_from_siblings(leaf, proven.index, &proven.output_hashes_siblings),
                claim.outputs_root
            );
        }
    }

    #[test]
    fn test_root_covers_earlier_epochs() {
        let first = output(1, 0, b"a");
        let second = output(2, 1, b"b");
        let alone = compute_epoch_claim(&[second.clone()], &[second.clone()], &[0; 32]).unwrap();
        let both = compute_epoch_claim(&[first, second.clone()], &[second], &[0; 32]).unwrap();
        assert_ne!(alone.outputs_root, both.outputs_root);
    }
}
