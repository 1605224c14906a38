//! Cross-worker scenarios.

pub mod fixtures;

mod claims;
mod pipeline;
mod signer;
