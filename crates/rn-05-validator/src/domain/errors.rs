//! # Validator Errors

use rn_01_repository::RepositoryError;
use shared_crypto::CryptoError;
use shared_types::{to_hex, Address, Hash};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The computed claim disagrees with the outputs hash the machine
    /// reported for the epoch's last input.
    #[error(
        "claim does not match for epoch {epoch_index} of {}: computed {}, machine reported {}",
        to_hex(.app),
        to_hex(.computed),
        reported_hex(.reported)
    )]
    ClaimMismatch {
        app: Address,
        epoch_index: u64,
        computed: Hash,
        reported: Option<Hash>,
    },

    /// No machine hash for the input, an earlier input or the template.
    #[error("input {input_index} of {} has no machine hash", to_hex(.app))]
    MissingMachineHash { app: Address, input_index: u64 },
}

fn reported_hex(reported: &Option<Hash>) -> String {
    reported.map_or_else(|| "nothing".to_string(), |hash| to_hex(&hash))
}

impl ValidatorError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            ValidatorError::Repository(e) => e.error_kind(),
            ValidatorError::Crypto(_) => "merkle",
            ValidatorError::ClaimMismatch { .. } => "claim_mismatch",
            ValidatorError::MissingMachineHash { .. } => "missing_machine_hash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message() {
        let err = ValidatorError::ClaimMismatch {
            app: [0xaa; 20],
            epoch_index: 3,
            computed: [0xde; 32],
            reported: Some([0xca; 32]),
        };
        let message = err.to_string();
        assert!(message.starts_with("claim does not match for epoch 3"));
        assert!(message.contains(&to_hex(&[0xca; 32])));
        assert_eq!(err.error_kind(), "claim_mismatch");
    }
}
