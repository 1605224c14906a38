//! Domain layer: transaction encodings, key derivation and signature rules.

pub mod errors;
pub mod hd;
pub mod signature;
pub mod transaction;
