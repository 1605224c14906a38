//! # Ports
//!
//! - `inbound` - The `Repository` API driven by the workers

pub mod inbound;
