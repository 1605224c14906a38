//! Domain layer: in-flight claim tracking and claimer errors.

pub mod errors;
pub mod in_flight;
