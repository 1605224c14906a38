//! # EVM Reader (rn-03)
//!
//! The left edge of the pipeline: turns finalized `InputAdded` events into
//! stored inputs and epochs, and mirrors claim acceptance and output
//! execution back into the repository.
//!
//! The reader never looks below the finalized head, so inputs are never
//! retracted by a reorg. A finalized head that moves backwards stops the
//! reader.
//!
//! ## Crate Structure
//!
//! - `domain/` - Epoch layout, partitioning and `ReaderError`
//! - `service` - The `EvmReader` loop

pub mod domain;
pub mod service;

pub use domain::epochs::{partition_inputs, EpochLayout};
pub use domain::errors::ReaderError;
pub use service::{EvmReader, ReaderConfig};
