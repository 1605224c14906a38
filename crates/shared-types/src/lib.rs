//! # Shared Types Crate
//!
//! Domain entities shared by the rollup pipeline workers.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every entity the repository persists is
//!   defined here, so the workers agree on one shape.
//! - **Surrogate References**: `Output -> Input -> Epoch -> Application`
//!   is a DAG of ids and addresses, never owning pointers.
//! - **String Statuses**: status enums round-trip through their snake-case
//!   names, which is how they are stored.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
