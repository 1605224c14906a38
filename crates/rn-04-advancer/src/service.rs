//! # Advancer Service
//!
//! One pass (`tick`):
//!
//! 1. Ask the repository for the unprocessed inputs of every non-open
//!    epoch of the applications with a loaded machine
//! 2. Feed each application's inputs to its machine in index order and
//!    store every result before advancing the next input
//! 3. Promote each application's closed epochs that have no unprocessed
//!    inputs left
//!
//! A machine failure aborts the pass. The failed input stays unprocessed
//! and is retried on the next pass, which the machine sees as the same
//! index again.

use std::sync::Arc;
use std::time::Duration;

use rn_01_repository::Repository;
use rollups_telemetry::{Metrics, Service};
use shared_types::{to_hex, Address, Input};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::domain::errors::AdvancerError;
use crate::ports::outbound::Machines;

/// Advancer configuration
#[derive(Debug, Clone)]
pub struct AdvancerConfig {
    pub poll_interval: Duration,
}

impl Default for AdvancerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub struct Advancer {
    config: AdvancerConfig,
    repo: Arc<dyn Repository>,
    machines: Arc<dyn Machines>,
    metrics: Metrics,
}

impl Advancer {
    pub fn new(
        config: AdvancerConfig,
        repo: Arc<dyn Repository>,
        machines: Arc<dyn Machines>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            repo,
            machines,
            metrics,
        }
    }

    /// Run until shutdown. A failed pass is logged and retried on the next
    /// tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            apps = self.machines.apps().len(),
            "[rn-04] Advancer started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[rn-04] Shutdown signal received");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // Dropping an in-flight pass on shutdown leaves at most one
            // input unstored, which the next start advances again.
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[rn-04] Shutdown signal received");
                    return;
                }
                result = self.tick() => {
                    if let Err(e) = result {
                        error!(
                            service = Service::Advancer.as_str(),
                            error_kind = e.error_kind(),
                            "[rn-04] Advance pass failed: {}",
                            e
                        );
                    }
                }
            }
        }
    }

    /// One pass over every application with a loaded machine. Returns the
    /// number of inputs advanced.
    pub async fn tick(&self) -> Result<u64, AdvancerError> {
        self.metrics.record_tick(Service::Advancer);
        let apps = self.machines.apps();
        let mut pending = self.repo.get_unprocessed_inputs(&apps).await?;

        let mut advanced = 0;
        for app in apps {
            if let Some(inputs) = pending.remove(&app) {
                advanced += self.advance_inputs(app, inputs).await?;
            }
            let promoted = self.repo.promote_closed_epochs_fully_processed(app).await?;
            if promoted > 0 {
                info!(
                    app = %to_hex(&app),
                    epochs = promoted,
                    "[rn-04] Epochs fully processed"
                );
            }
        }
        Ok(advanced)
    }

    async fn advance_inputs(&self, app: Address, inputs: Vec<Input>) -> Result<u64, AdvancerError> {
        let mut advanced = 0;
        for input in inputs {
            let result = self
                .machines
                .advance(app, &input.raw_data, input.index)
                .await
                .map_err(|source| AdvancerError::Machine {
                    app,
                    index: input.index,
                    source,
                })?;

            self.repo.store_advance_result(&input, &result).await?;
            self.metrics.record_input_advanced(result.status.as_str());
            advanced += 1;
            debug!(
                app = %to_hex(&app),
                index = input.index,
                status = result.status.as_str(),
                outputs = result.outputs.len(),
                reports = result.reports.len(),
                "[rn-04] Input advanced"
            );
        }
        Ok(advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::MockMachine;
    use rn_01_repository::InMemoryRepository;
    use shared_types::{Application, Epoch, EpochInputs, EpochStatus, InputCompletionStatus};

    const APP: Address = [0xaa; 20];

    fn epoch(index: u64, status: EpochStatus) -> Epoch {
        Epoch {
            status,
            ..Epoch::at_index(APP, index, 5, 16)
        }
    }

    fn input(index: u64, block: u64, payload: &[u8]) -> Input {
        Input::unprocessed(APP, index, block, payload.to_vec(), [index as u8; 32])
    }

    /// Epoch 0 `[16, 20]` closed with inputs 0 and 1, epoch 1 `[21, 25]`
    /// open with input 2.
    async fn seeded() -> (Arc<InMemoryRepository>, Arc<MockMachine>, Advancer) {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_application(&Application::new(APP, [0x01; 32], [0xcc; 20]))
            .await
            .unwrap();
        repo.store_epochs_and_inputs(
            APP,
            vec![
                EpochInputs {
                    epoch: epoch(0, EpochStatus::Closed),
                    inputs: vec![input(0, 17, b"hello"), input(1, 19, b"reject-me")],
                },
                EpochInputs {
                    epoch: epoch(1, EpochStatus::Open),
                    inputs: vec![input(2, 22, b"later")],
                },
            ],
            23,
        )
        .await
        .unwrap();

        let machine = Arc::new(MockMachine::new([APP]));
        machine.script(b"reject-me", InputCompletionStatus::Rejected);
        let advancer = Advancer::new(
            AdvancerConfig::default(),
            repo.clone(),
            machine.clone(),
            Metrics::new().unwrap(),
        );
        (repo, machine, advancer)
    }

    #[tokio::test]
    async fn test_tick_advances_closed_epochs_only() {
        let (repo, machine, advancer) = seeded().await;

        assert_eq!(advancer.tick().await.unwrap(), 2);
        assert_eq!(machine.advanced(APP), 2);

        let accepted = repo.get_input(APP, 0).await.unwrap().unwrap();
        assert_eq!(accepted.status, InputCompletionStatus::Accepted);
        let outputs = repo.get_outputs_by_input(accepted.id).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].raw_data, b"hello".to_vec());
        assert_eq!(repo.get_reports_by_input(accepted.id).await.unwrap().len(), 1);

        let rejected = repo.get_input(APP, 1).await.unwrap().unwrap();
        assert_eq!(rejected.status, InputCompletionStatus::Rejected);
        assert!(repo.get_outputs_by_input(rejected.id).await.unwrap().is_empty());
        assert_eq!(rejected.machine_hash, accepted.machine_hash);

        let open = repo.get_input(APP, 2).await.unwrap().unwrap();
        assert_eq!(open.status, InputCompletionStatus::None);

        let epoch0 = repo.get_epoch(APP, 0).await.unwrap().unwrap();
        assert_eq!(epoch0.status, EpochStatus::ProcessedAllInputs);
        let epoch1 = repo.get_epoch(APP, 1).await.unwrap().unwrap();
        assert_eq!(epoch1.status, EpochStatus::Open);
    }

    #[tokio::test]
    async fn test_second_tick_is_idle() {
        let (_repo, machine, advancer) = seeded().await;
        advancer.tick().await.unwrap();
        assert_eq!(advancer.tick().await.unwrap(), 0);
        assert_eq!(machine.advanced(APP), 2);
    }

    #[tokio::test]
    async fn test_machine_failure_leaves_input_for_retry() {
        let (repo, machine, advancer) = seeded().await;
        machine.fail_next_advances(1);

        let err = advancer.tick().await.unwrap_err();
        assert_eq!(err.error_kind(), "machine_transport");
        assert!(matches!(err, AdvancerError::Machine { index: 0, .. }));
        let input = repo.get_input(APP, 0).await.unwrap().unwrap();
        assert_eq!(input.status, InputCompletionStatus::None);
        let epoch0 = repo.get_epoch(APP, 0).await.unwrap().unwrap();
        assert_eq!(epoch0.status, EpochStatus::Closed);

        assert_eq!(advancer.tick().await.unwrap(), 2);
        let epoch0 = repo.get_epoch(APP, 0).await.unwrap().unwrap();
        assert_eq!(epoch0.status, EpochStatus::ProcessedAllInputs);
    }

    #[tokio::test]
    async fn test_limit_statuses_are_stored_and_processing_continues() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_application(&Application::new(APP, [0x01; 32], [0xcc; 20]))
            .await
            .unwrap();
        repo.store_epochs_and_inputs(
            APP,
            vec![EpochInputs {
                epoch: epoch(0, EpochStatus::Closed),
                inputs: vec![
                    input(0, 16, b"spin"),
                    input(1, 17, b"sleep"),
                    input(2, 18, b"huge"),
                    input(3, 18, b"panic"),
                    input(4, 20, b"fine"),
                ],
            }],
            21,
        )
        .await
        .unwrap();
        let machine = Arc::new(MockMachine::new([APP]));
        machine.script(b"spin", InputCompletionStatus::CycleLimitExceeded);
        machine.script(b"sleep", InputCompletionStatus::TimeLimitExceeded);
        machine.script(b"huge", InputCompletionStatus::PayloadLengthLimitExceeded);
        machine.script(b"panic", InputCompletionStatus::Exception);
        let advancer = Advancer::new(
            AdvancerConfig::default(),
            repo.clone(),
            machine.clone(),
            Metrics::new().unwrap(),
        );

        assert_eq!(advancer.tick().await.unwrap(), 5);
        assert_eq!(machine.advanced(APP), 5);

        let expected = [
            InputCompletionStatus::CycleLimitExceeded,
            InputCompletionStatus::TimeLimitExceeded,
            InputCompletionStatus::PayloadLengthLimitExceeded,
            InputCompletionStatus::Exception,
        ];
        for (index, status) in expected.into_iter().enumerate() {
            let limited = repo.get_input(APP, index as u64).await.unwrap().unwrap();
            assert_eq!(limited.status, status);
            assert!(repo.get_outputs_by_input(limited.id).await.unwrap().is_empty());
            assert!(repo.get_reports_by_input(limited.id).await.unwrap().is_empty());
        }

        let accepted = repo.get_input(APP, 4).await.unwrap().unwrap();
        assert_eq!(accepted.status, InputCompletionStatus::Accepted);
        let outputs = repo.get_outputs_by_input(accepted.id).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].index, 0);
        assert_eq!(outputs[0].raw_data, b"fine".to_vec());

        let epoch0 = repo.get_epoch(APP, 0).await.unwrap().unwrap();
        assert_eq!(epoch0.status, EpochStatus::ProcessedAllInputs);
    }

    #[tokio::test]
    async fn test_empty_closed_epoch_is_promoted() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_application(&Application::new(APP, [0x01; 32], [0xcc; 20]))
            .await
            .unwrap();
        repo.store_epochs_and_inputs(
            APP,
            vec![EpochInputs {
                epoch: epoch(0, EpochStatus::Closed),
                inputs: vec![],
            }],
            21,
        )
        .await
        .unwrap();
        let advancer = Advancer::new(
            AdvancerConfig::default(),
            repo.clone(),
            Arc::new(MockMachine::new([APP])),
            Metrics::new().unwrap(),
        );

        assert_eq!(advancer.tick().await.unwrap(), 0);
        let epoch0 = repo.get_epoch(APP, 0).await.unwrap().unwrap();
        assert_eq!(epoch0.status, EpochStatus::ProcessedAllInputs);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (repo, _machine, advancer) = seeded().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(advancer.run(shutdown_rx));

        for _ in 0..100 {
            let epoch0 = repo.get_epoch(APP, 0).await.unwrap().unwrap();
            if epoch0.status == EpochStatus::ProcessedAllInputs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        let epoch0 = repo.get_epoch(APP, 0).await.unwrap().unwrap();
        assert_eq!(epoch0.status, EpochStatus::ProcessedAllInputs);
    }
}
