//! Adapters layer: machine transports.

pub mod remote;
