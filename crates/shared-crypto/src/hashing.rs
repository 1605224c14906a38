//! # Keccak-256 Hashing

use sha3::{Digest, Keccak256};
use shared_types::Hash;

/// Keccak-256 of `data` (one-shot).
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 of the concatenation of `parts`.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_concat_matches_single_buffer() {
        let joined = [b"dead".as_slice(), b"beef".as_slice()].concat();
        assert_eq!(keccak256_concat(&[b"dead", b"beef"]), keccak256(&joined));
    }
}
