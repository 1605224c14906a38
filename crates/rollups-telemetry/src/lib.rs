//! # Rollups Telemetry
//!
//! Observability for the rollups node workers.
//!
//! ## Components
//!
//! - **Logging**: `tracing` subscriber, pretty for terminals or JSON lines
//!   for log shippers.
//! - **Metrics**: per-process Prometheus registry with the pipeline counters.
//! - **Server**: `axum` endpoint serving `/metrics` and `/healthz`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollups_telemetry::{init_logging, serve_metrics, Metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! init_logging(&config)?;
//! let metrics = Metrics::new()?;
//! tokio::spawn(serve_metrics(config.http_address, metrics.clone(), shutdown_rx));
//! ```

mod config;
mod logging;
mod metrics;
mod server;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{Metrics, Service};
pub use server::{router, serve_metrics};

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("failed to register metrics: {0}")]
    MetricsInit(#[from] prometheus::Error),

    #[error("metrics server failed: {0}")]
    Server(#[from] std::io::Error),
}

impl TelemetryError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            TelemetryError::LoggingInit(_) => "logging_init",
            TelemetryError::MetricsInit(_) => "metrics_init",
            TelemetryError::Server(_) => "metrics_server",
        }
    }
}
