//! Domain layer: epoch partitioning and reader errors.

pub mod epochs;
pub mod errors;
