//! # Advancer Errors

use rn_01_repository::RepositoryError;
use shared_types::{to_hex, Address};
use thiserror::Error;

/// Infrastructure failures of a machine. VM-level outcomes (rejection,
/// limits) are completion statuses, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("no machine loaded for application {}", to_hex(.0))]
    UnknownApplication(Address),

    #[error("machine transport error: {0}")]
    Transport(String),

    #[error("machine server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("malformed advance response: {0}")]
    Decode(String),
}

impl MachineError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            MachineError::UnknownApplication(_) => "unknown_machine",
            MachineError::Transport(_) => "machine_transport",
            MachineError::Server { .. } => "machine_server",
            MachineError::Decode(_) => "machine_decode",
        }
    }
}

impl From<reqwest::Error> for MachineError {
    fn from(e: reqwest::Error) -> Self {
        MachineError::Transport(e.to_string())
    }
}

/// Errors that abort an advancer tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvancerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("advancing input {index} of {}: {source}", to_hex(.app))]
    Machine {
        app: Address,
        index: u64,
        #[source]
        source: MachineError,
    },
}

impl AdvancerError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            AdvancerError::Repository(e) => e.error_kind(),
            AdvancerError::Machine { source, .. } => source.error_kind(),
        }
    }
}
