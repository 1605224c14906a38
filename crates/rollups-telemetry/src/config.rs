//! Telemetry configuration.

use std::net::SocketAddr;

/// Logging and metrics exposition settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directive (`info`, `rn_03_evm_reader=debug`, ...).
    /// `RUST_LOG` takes precedence when set.
    pub log_level: String,

    /// Human-readable ANSI output instead of JSON lines.
    pub log_pretty: bool,

    /// Address the `/metrics` server binds to.
    pub http_address: SocketAddr,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_pretty: false,
            http_address: SocketAddr::from(([127, 0, 0, 1], 10000)),
        }
    }
}
