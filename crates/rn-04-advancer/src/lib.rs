//! # Advancer (rn-04)
//!
//! Drives every application's VM over the inputs of closed epochs, in
//! input-index order, and persists what the VM produced: the completion
//! status, outputs, reports, the outputs hash and the machine hash.
//!
//! An epoch reaches `processed_all_inputs` only here, once it is closed and
//! none of its inputs is left unprocessed.
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - `MachineError` and `AdvancerError`
//! - `ports/` - The `Machines` SPI and the echo `MockMachine`
//! - `adapters/` - `RemoteMachines`, a machine server over HTTP
//! - `service` - The `Advancer` loop

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::remote::RemoteMachines;
pub use domain::errors::{AdvancerError, MachineError};
pub use ports::outbound::{Machines, MockMachine};
pub use service::{Advancer, AdvancerConfig};
