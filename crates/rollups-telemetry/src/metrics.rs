//! Prometheus metrics for the rollup pipeline.
//!
//! All metrics follow the naming convention `rollups_<metric>_<unit>`.
//! Each process owns one `Metrics` value with its own `Registry`, so tests
//! can assert on exact counts without cross-test interference.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

/// The pipeline workers, used as the `service` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    EvmReader,
    Advancer,
    Validator,
    Claimer,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::EvmReader => "evm-reader",
            Service::Advancer => "advancer",
            Service::Validator => "validator",
            Service::Claimer => "claimer",
        }
    }
}

struct Counters {
    registry: Registry,
    tick_total: IntCounterVec,
    inputs_read_total: IntCounter,
    inputs_advanced_total: IntCounterVec,
    claims_computed_total: IntCounter,
    claims_submitted_total: IntCounter,
    duplicate_claim_total: IntCounter,
    submit_fail_total: IntCounter,
}

/// Cheap-to-clone handle to the node's counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Counters>,
}

impl Metrics {
    /// Create and register every counter in a fresh registry.
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let tick_total = IntCounterVec::new(
            Opts::new("rollups_tick_total", "Worker loop iterations"),
            &["service"],
        )?;
        let inputs_read_total = IntCounter::new(
            "rollups_inputs_read_total",
            "Inputs persisted by the evm reader",
        )?;
        let inputs_advanced_total = IntCounterVec::new(
            Opts::new("rollups_inputs_advanced_total", "Inputs run through the VM"),
            &["status"],
        )?;
        let claims_computed_total = IntCounter::new(
            "rollups_claims_computed_total",
            "Epoch claims computed by the validator",
        )?;
        let claims_submitted_total = IntCounter::new(
            "rollups_claims_submitted_total",
            "Claim transactions broadcast by this node",
        )?;
        let duplicate_claim_total = IntCounter::new(
            "rollups_duplicate_claim_total",
            "Pending claims found already submitted by another sender",
        )?;
        let submit_fail_total = IntCounter::new(
            "rollups_submit_fail_total",
            "Claim submissions that failed to broadcast",
        )?;

        registry.register(Box::new(tick_total.clone()))?;
        registry.register(Box::new(inputs_read_total.clone()))?;
        registry.register(Box::new(inputs_advanced_total.clone()))?;
        registry.register(Box::new(claims_computed_total.clone()))?;
        registry.register(Box::new(claims_submitted_total.clone()))?;
        registry.register(Box::new(duplicate_claim_total.clone()))?;
        registry.register(Box::new(submit_fail_total.clone()))?;

        Ok(Self {
            inner: Arc::new(Counters {
                registry,
                tick_total,
                inputs_read_total,
                inputs_advanced_total,
                claims_computed_total,
                claims_submitted_total,
                duplicate_claim_total,
                submit_fail_total,
            }),
        })
    }

    pub fn record_tick(&self, service: Service) {
        self.inner
            .tick_total
            .with_label_values(&[service.as_str()])
            .inc();
    }

    pub fn record_inputs_read(&self, count: u64) {
        self.inner.inputs_read_total.inc_by(count);
    }

    pub fn record_input_advanced(&self, status: &str) {
        self.inner
            .inputs_advanced_total
            .with_label_values(&[status])
            .inc();
    }

    pub fn record_claim_computed(&self) {
        self.inner.claims_computed_total.inc();
    }

    pub fn record_claim_submitted(&self) {
        self.inner.claims_submitted_total.inc();
    }

    pub fn record_duplicate_claim(&self) {
        self.inner.duplicate_claim_total.inc();
    }

    pub fn record_submit_failure(&self) {
        self.inner.submit_fail_total.inc();
    }

    pub fn ticks(&self, service: Service) -> u64 {
        self.inner
            .tick_total
            .with_label_values(&[service.as_str()])
            .get()
    }

    pub fn claims_submitted(&self) -> u64 {
        self.inner.claims_submitted_total.get()
    }

    pub fn duplicate_claims(&self) -> u64 {
        self.inner.duplicate_claim_total.get()
    }

    pub fn submit_failures(&self) -> u64 {
        self.inner.submit_fail_total.get()
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero_per_instance() {
        let first = Metrics::new().unwrap();
        first.record_duplicate_claim();

        let second = Metrics::new().unwrap();
        assert_eq!(first.duplicate_claims(), 1);
        assert_eq!(second.duplicate_claims(), 0);
    }

    #[test]
    fn test_ticks_are_labelled_by_service() {
        let metrics = Metrics::new().unwrap();
        metrics.record_tick(Service::Claimer);
        metrics.record_tick(Service::Claimer);
        metrics.record_tick(Service::Advancer);

        assert_eq!(metrics.ticks(Service::Claimer), 2);
        assert_eq!(metrics.ticks(Service::Validator), 0);
    }

    #[test]
    fn test_encode_contains_pipeline_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_tick(Service::EvmReader);
        metrics.record_submit_failure();

        let text = metrics.encode().unwrap();
        assert!(text.contains("rollups_tick_total{service=\"evm-reader\"} 1"));
        assert!(text.contains("rollups_submit_fail_total 1"));
        assert!(text.contains("rollups_duplicate_claim_total 0"));
    }
}
