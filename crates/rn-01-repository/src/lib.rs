//! # Repository (rn-01)
//!
//! The single owner of persistent rollup state. Workers never talk to each
//! other; they coordinate only through the status transitions this crate
//! enforces.
//!
//! ## Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | Input indices are dense from 0 per application | `store_epochs_and_inputs` |
//! | Every input lies inside its epoch's block range | `store_epochs_and_inputs` |
//! | Output indices are dense per application | `store_advance_result` (`MAX(index)+1`) |
//! | Only accepted inputs carry outputs | `store_advance_result` |
//! | Epoch statuses move one step forward at a time | every epoch update |
//! | `last_processed_block` never decreases | `store_epochs_and_inputs` |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Errors and the write rules shared by all adapters
//! - `ports/` - The `Repository` trait
//! - `adapters/` - `InMemoryRepository`, `PostgresRepository`
//! - `waiter` - Block-range output waiter used by the Validator
//!
//! ## Usage
//!
//! ```ignore
//! use rn_01_repository::{InMemoryRepository, Repository};
//!
//! let repo = InMemoryRepository::new();
//! repo.insert_application(&app).await?;
//! repo.store_epochs_and_inputs(app.contract_address, batch, finalized).await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod waiter;

pub use adapters::memory::InMemoryRepository;
#[cfg(feature = "postgres")]
pub use adapters::postgres::PostgresRepository;
pub use domain::errors::RepositoryError;
pub use ports::inbound::{Repository, SCHEMA_VERSION};
pub use waiter::wait_for_outputs_in_block_range;
