//! # Repository Errors
//!
//! Every variant maps either to a broken persistence invariant (the caller
//! asked for something the stored state does not allow) or to a backend
//! failure. Invariant violations are never retried by the workers.

use shared_types::{to_hex, Address, EpochStatus, InputCompletionStatus};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("application {} not found", to_hex(.0))]
    ApplicationNotFound(Address),

    #[error("application {} already exists", to_hex(.0))]
    DuplicateApplication(Address),

    #[error("epoch {index} of application {} already exists with a different block range", to_hex(.app))]
    DuplicateEpoch { app: Address, index: u64 },

    #[error("epoch {found} of application {} would leave a gap after epoch index {expected}", to_hex(.app))]
    EpochIndexGap {
        app: Address,
        expected: u64,
        found: u64,
    },

    #[error("epoch {0} not found")]
    EpochNotFound(u64),

    #[error("input {index} of application {} already exists", to_hex(.app))]
    DuplicateInput { app: Address, index: u64 },

    #[error("input {found} of application {} skips expected index {expected}", to_hex(.app))]
    InputIndexGap {
        app: Address,
        expected: u64,
        found: u64,
    },

    #[error("input {index} at block {block} lies outside epoch [{first_block}, {last_block}]")]
    InputOutsideEpoch {
        index: u64,
        block: u64,
        first_block: u64,
        last_block: u64,
    },

    #[error("input {0} not found")]
    InputNotFound(u64),

    #[error("input {input_id} was already processed with status {status}")]
    InputAlreadyProcessed {
        input_id: u64,
        status: InputCompletionStatus,
    },

    #[error("input {input_id} finished with status {status} but produced outputs")]
    OutputsOnUnacceptedInput {
        input_id: u64,
        status: InputCompletionStatus,
    },

    #[error("output {0} not found")]
    OutputNotFound(u64),

    #[error("epoch {epoch_id} cannot move from {from} to {to}")]
    InvalidTransition {
        epoch_id: u64,
        from: EpochStatus,
        to: EpochStatus,
    },

    #[error("epoch {epoch_id} has status {status}, expected processed_all_inputs")]
    EpochNotProcessed { epoch_id: u64, status: EpochStatus },

    #[error("last processed block of application {} cannot regress from {current} to {requested}", to_hex(.app))]
    ProcessedBlockRegression {
        app: Address,
        current: u64,
        requested: u64,
    },

    #[error("database schema version {found} does not match expected {expected}")]
    SchemaVersionMismatch { expected: i64, found: i64 },

    #[error("timed out after {waited_ms}ms waiting for inputs in blocks [{first_block}, {last_block}]")]
    WaitTimeout {
        first_block: u64,
        last_block: u64,
        waited_ms: u128,
    },

    /// Stored data that cannot be mapped back to a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),
}

impl RepositoryError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            RepositoryError::ApplicationNotFound(_) => "application_not_found",
            RepositoryError::DuplicateApplication(_) => "duplicate_application",
            RepositoryError::DuplicateEpoch { .. } => "duplicate_epoch",
            RepositoryError::EpochIndexGap { .. } => "epoch_index_gap",
            RepositoryError::EpochNotFound(_) => "epoch_not_found",
            RepositoryError::DuplicateInput { .. } => "duplicate_input",
            RepositoryError::InputIndexGap { .. } => "input_index_gap",
            RepositoryError::InputOutsideEpoch { .. } => "input_outside_epoch",
            RepositoryError::InputNotFound(_) => "input_not_found",
            RepositoryError::InputAlreadyProcessed { .. } => "input_already_processed",
            RepositoryError::OutputsOnUnacceptedInput { .. } => "outputs_on_unaccepted_input",
            RepositoryError::OutputNotFound(_) => "output_not_found",
            RepositoryError::InvalidTransition { .. } => "invalid_transition",
            RepositoryError::EpochNotProcessed { .. } => "epoch_not_processed",
            RepositoryError::ProcessedBlockRegression { .. } => "processed_block_regression",
            RepositoryError::SchemaVersionMismatch { .. } => "schema_version_mismatch",
            RepositoryError::WaitTimeout { .. } => "wait_timeout",
            RepositoryError::Corrupt(_) => "corrupt_row",
            RepositoryError::Database(_) => "database",
        }
    }

    /// Backend hiccups worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::Database(_) | RepositoryError::WaitTimeout { .. }
        )
    }
}

impl From<shared_types::UnknownStatus> for RepositoryError {
    fn from(e: shared_types::UnknownStatus) -> Self {
        RepositoryError::Corrupt(e.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        RepositoryError::Database(e.to_string())
    }
}
