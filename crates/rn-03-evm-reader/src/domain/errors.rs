//! # Reader Errors

use rn_01_repository::RepositoryError;
use shared_l1::L1Error;
use shared_types::{to_hex, Address};
use thiserror::Error;

/// Errors that stop the reader loop.
///
/// L1 errors only surface here once the retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    L1(#[from] L1Error),

    /// The chain reported a finalized head below one already observed.
    #[error("finalized head moved backwards from {previous} to {current}")]
    FinalizedRegression { previous: u64, current: u64 },

    /// Local input count disagrees with `InputBox.getNumberOfInputs`.
    #[error("application {} has {local} inputs stored but {onchain} on chain at block {block}", to_hex(.app))]
    InputCountMismatch {
        app: Address,
        local: u64,
        onchain: u64,
        block: u64,
    },

    /// An `InputAdded` log for another application leaked into the scan.
    #[error("input log for {} returned while scanning {}", to_hex(.found), to_hex(.expected))]
    ForeignInput { expected: Address, found: Address },
}

impl ReaderError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            ReaderError::Repository(e) => e.error_kind(),
            ReaderError::L1(e) => e.error_kind(),
            ReaderError::FinalizedRegression { .. } => "finalized_regression",
            ReaderError::InputCountMismatch { .. } => "input_count_mismatch",
            ReaderError::ForeignInput { .. } => "foreign_input",
        }
    }
}
