//! # L1 Errors

use thiserror::Error;

/// Failures talking to, or decoding data from, the L1 chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum L1Error {
    /// The request never produced a response (connection, timeout, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered without a `result`.
    #[error("missing result for {0}")]
    MissingResult(String),

    /// The requested block does not exist (yet).
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// Response or log data did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The header subscription failed.
    #[error("subscription error: {0}")]
    Subscription(String),
}

impl L1Error {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            L1Error::Transport(_) => "l1_transport",
            L1Error::Rpc { .. } => "l1_rpc",
            L1Error::MissingResult(_) => "l1_missing_result",
            L1Error::BlockNotFound(_) => "l1_block_not_found",
            L1Error::Decode(_) => "l1_decode",
            L1Error::Subscription(_) => "l1_subscription",
        }
    }
}

impl From<reqwest::Error> for L1Error {
    fn from(e: reqwest::Error) -> Self {
        L1Error::Transport(e.to_string())
    }
}

impl From<alloy_sol_types::Error> for L1Error {
    fn from(e: alloy_sol_types::Error) -> Self {
        L1Error::Decode(e.to_string())
    }
}

impl From<shared_types::HexError> for L1Error {
    fn from(e: shared_types::HexError) -> Self {
        L1Error::Decode(e.to_string())
    }
}
