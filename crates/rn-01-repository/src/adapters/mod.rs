//! # Adapters
//!
//! - `memory` - In-process maps, for tests
//! - `postgres` - PostgreSQL via `sqlx` (feature `postgres`)

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
