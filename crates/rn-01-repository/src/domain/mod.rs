//! # Domain Layer
//!
//! - `errors` - Repository error type
//! - `rules` - Write validation shared by all adapters

pub mod errors;
pub mod rules;
