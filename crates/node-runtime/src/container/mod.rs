//! # Service Container
//!
//! Configuration and the shared infrastructure the workers are built from.
//!
//! - `cli` - raw `ROLLUPS_*` settings
//! - `config` - validated [`NodeConfig`]
//! - `services` - adapters, signer and startup checks

pub mod cli;
pub mod config;
pub mod services;

pub use cli::Cli;
pub use config::{ConfigError, NodeConfig, Redacted};
pub use services::{build_signer, ServiceContainer, StartupError};
