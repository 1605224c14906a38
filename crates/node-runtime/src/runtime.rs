//! # Node Runtime
//!
//! Spawns the workers over a [`ServiceContainer`] and supervises them.
//!
//! ## Shutdown
//!
//! Every task watches one `watch::channel(bool)`. SIGINT or SIGTERM flips
//! it and the runtime waits for the tasks to drain. A task that ends on its
//! own before that (the reader after an unrecoverable error, or a panic)
//! is fatal: the runtime flips the channel itself and returns the error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rn_03_evm_reader::{EvmReader, ReaderConfig};
use rn_04_advancer::{Advancer, AdvancerConfig};
use rn_05_validator::{Validator, ValidatorConfig};
use rn_06_claimer::{Claimer, ClaimerConfig};
use rollups_telemetry::serve_metrics;
use shared_l1::HeaderSubscriber;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::container::ServiceContainer;

/// How long workers get to finish after shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const HEADS_CHANNEL_CAPACITY: usize = 16;

type TaskOutcome = (&'static str, Result<()>);

/// The running node.
pub struct NodeRuntime {
    container: ServiceContainer,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    pub fn new(container: ServiceContainer) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            container,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Run until SIGINT/SIGTERM or a fatal worker error.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `stop` resolves or a fatal worker error.
    pub async fn run_until(self, stop: impl Future<Output = ()>) -> Result<()> {
        let mut tasks = self.spawn_workers();
        tokio::pin!(stop);

        let outcome = tokio::select! {
            _ = &mut stop => {
                info!("Shutdown requested");
                Ok(())
            }
            joined = tasks.join_next() => match joined {
                Some(Ok((name, Ok(())))) => Err(anyhow!("{name} stopped unexpectedly")),
                Some(Ok((name, Err(e)))) => Err(e.context(format!("{name} failed"))),
                Some(Err(e)) => Err(anyhow!("worker task aborted: {e}")),
                None => Err(anyhow!("no workers running")),
            },
        };

        if let Err(e) = &outcome {
            error!("Fatal: {:#}", e);
        }
        self.shutdown();
        drain(tasks).await;
        outcome
    }

    /// Signal every worker to stop.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        // Receivers may already be gone when a worker failed first.
        let _ = self.shutdown_tx.send(true);
    }

    fn spawn_workers(&self) -> JoinSet<TaskOutcome> {
        let container = &self.container;
        let config = &container.config;
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        // ===== METRICS =====
        let server = serve_metrics(
            config.telemetry.http_address,
            container.metrics.clone(),
            self.shutdown_rx.clone(),
        );
        tasks.spawn(async move { ("metrics server", server.await.map_err(Into::into)) });

        // ===== L1 READER =====
        let heads = config.chain.ws_endpoint.as_ref().map(|ws| {
            let (heads_tx, heads_rx) = mpsc::channel(HEADS_CHANNEL_CAPACITY);
            let subscriber = HeaderSubscriber::new(ws.clone());
            let shutdown = self.shutdown_rx.clone();
            tasks.spawn(async move {
                subscriber.run(heads_tx, shutdown).await;
                ("header subscriber", Ok(()))
            });
            heads_rx
        });
        let reader = EvmReader::new(
            ReaderConfig {
                input_box_address: config.input_box.address,
                input_box_deployment_block: config.input_box.deployment_block,
                epoch_length: config.epoch_length,
                default_block: config.chain.default_block,
                finality_offset: config.chain.finality_offset,
                max_fetch_size: config.reader.max_fetch_size,
                retry: config.reader.retry_policy(),
                poll_interval: config.polling.evm_reader,
            },
            Arc::clone(&container.repo),
            Arc::clone(&container.client),
            container.metrics.clone(),
        );
        let shutdown = self.shutdown_rx.clone();
        tasks.spawn(async move {
            ("evm reader", reader.run(heads, shutdown).await.map_err(Into::into))
        });

        // ===== ADVANCER =====
        let advancer = Advancer::new(
            AdvancerConfig {
                poll_interval: config.polling.advancer,
            },
            Arc::clone(&container.repo),
            Arc::clone(&container.machines),
            container.metrics.clone(),
        );
        let shutdown = self.shutdown_rx.clone();
        tasks.spawn(async move {
            advancer.run(shutdown).await;
            ("advancer", Ok(()))
        });

        // ===== VALIDATOR =====
        let validator = Validator::new(
            ValidatorConfig {
                poll_interval: config.polling.validator,
                machine_hash_check: config.features.machine_hash_check_enabled,
                ..ValidatorConfig::default()
            },
            Arc::clone(&container.repo),
            container.metrics.clone(),
        );
        let shutdown = self.shutdown_rx.clone();
        tasks.spawn(async move {
            validator.run(shutdown).await;
            ("validator", Ok(()))
        });

        // ===== CLAIMER =====
        match (&container.signer, config.features.claimer_enabled) {
            (Some(signer), true) => {
                let claimer = Claimer::new(
                    ClaimerConfig {
                        chain_id: config.chain.chain_id,
                        poll_interval: config.polling.claimer,
                        max_fetch_size: config.reader.max_fetch_size,
                        retry: config.reader.retry_policy(),
                    },
                    Arc::clone(&container.repo),
                    Arc::clone(&container.client),
                    Arc::clone(signer),
                    container.metrics.clone(),
                );
                let shutdown = self.shutdown_rx.clone();
                tasks.spawn(async move {
                    claimer.run(shutdown).await;
                    ("claimer", Ok(()))
                });
            }
            _ => warn!("Claimer disabled, claims will be computed but not submitted"),
        }

        info!(workers = tasks.len(), "All workers started");
        tasks
    }
}

/// Wait for every task, aborting what is left after [`DRAIN_TIMEOUT`].
async fn drain(mut tasks: JoinSet<TaskOutcome>) {
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!("{name} stopped"),
                Ok((name, Err(e))) => warn!("{name} stopped with error: {:#}", e),
                Err(e) => warn!("worker task aborted: {e}"),
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(remaining = tasks.len(), "Workers did not stop in time, aborting");
        tasks.abort_all();
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
