//! Domain layer: machine and advancer errors.

pub mod errors;
