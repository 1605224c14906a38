//! # Claimer (rn-06)
//!
//! Moves every `claim_computed` epoch to `claim_submitted` exactly once.
//! Before sending anything it checks the consensus contract for a
//! `ClaimSubmission` carrying the same claim, so a claim another validator
//! already submitted is adopted with that validator's transaction instead
//! of being sent again.
//!
//! ## Crate Structure
//!
//! - `domain/` - In-flight claim tracking and `ClaimerError`
//! - `service` - The `Claimer` loop

pub mod domain;
pub mod service;

pub use domain::errors::ClaimerError;
pub use domain::in_flight::{ClaimKey, InFlightClaims, RESUBMIT_AFTER_BLOCKS};
pub use service::{Claimer, ClaimerConfig, ClaimerTick};
