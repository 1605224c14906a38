//! # Claimer Errors

use rn_01_repository::RepositoryError;
use rn_02_signer::SignerError;
use shared_l1::L1Error;
use thiserror::Error;

/// Errors that abort a claimer tick. A reverting `submitClaim` is not one
/// of them: it is logged and retried on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    L1(#[from] L1Error),

    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl ClaimerError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            ClaimerError::Repository(e) => e.error_kind(),
            ClaimerError::L1(e) => e.error_kind(),
            ClaimerError::Signer(e) => e.error_kind(),
        }
    }
}
