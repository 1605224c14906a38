//! # Rollups Node Runtime
//!
//! Library half of the `rollups-node` binary, exposed for tests.
//!
//! ## Startup Sequence
//!
//! 1. Parse `ROLLUPS_*` settings into a validated `NodeConfig`
//! 2. Initialize logging and the metrics registry
//! 3. Connect PostgreSQL and check the schema version
//! 4. Check the L1 chain id and every application's template hash
//! 5. Spawn the reader, advancer, validator and (optionally) claimer
//! 6. Supervise until a signal or a fatal worker error

pub mod container;
pub mod runtime;

pub use container::{Cli, ConfigError, NodeConfig, ServiceContainer, StartupError};
pub use runtime::{shutdown_signal, NodeRuntime};
