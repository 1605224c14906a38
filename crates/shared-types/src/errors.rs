//! # Error Types
//!
//! Errors raised while decoding shared entities.

use thiserror::Error;

/// A stored status string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The offending string.
    pub value: String,
}

/// Errors parsing hex-encoded hashes and addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    /// The string is not valid hex.
    #[error("invalid hex: {0}")]
    Invalid(String),

    /// The decoded value has the wrong width.
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}
