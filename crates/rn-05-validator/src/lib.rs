//! # Validator (rn-05)
//!
//! Turns fully processed epochs into claims. Every claim commits to the
//! whole output history of the application up to the epoch's last block,
//! and every output gets a sibling path against that root so it can be
//! executed on L1 later.
//!
//! ## Crate Structure
//!
//! - `domain/` - Claim computation and `ValidatorError`
//! - `service` - The `Validator` loop

pub mod domain;
pub mod service;

pub use domain::claims::{claim_hash, compute_epoch_claim, empty_outputs_root, EpochClaim};
pub use domain::errors::ValidatorError;
pub use service::{Validator, ValidatorConfig};
