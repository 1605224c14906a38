//! Domain layer: claim computation and validator errors.

pub mod claims;
pub mod errors;
