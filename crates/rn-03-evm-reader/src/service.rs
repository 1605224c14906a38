//! # EVM Reader Service
//!
//! One pass (`tick`) does, for every running application:
//!
//! 1. Resolve the finalized head (or `latest - finality_offset`)
//! 2. Read `InputAdded` events in `[last_processed + 1, head]`
//! 3. Partition them into epochs and store them with the new cursor
//! 4. Check the stored input count against `getNumberOfInputs` at `head`
//! 5. Scan `ClaimAcceptance` and `OutputExecuted` past their cursors
//!
//! `run` does one catch-up pass at startup and then one pass per wake-up,
//! where a wake-up is a new-head notification or the fallback poll timer.

use std::sync::Arc;
use std::time::Duration;

use rn_01_repository::Repository;
use rollups_telemetry::{Metrics, Service};
use shared_l1::{
    ApplicationContract, BlockTag, ConsensusContract, EthClient, InputBox, RetryPolicy,
};
use shared_types::{to_hex, Address, Application, EpochStatus};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::domain::epochs::{partition_inputs, EpochLayout};
use crate::domain::errors::ReaderError;

/// Reader configuration
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub input_box_address: Address,
    /// First block of epoch 0.
    pub input_box_deployment_block: u64,
    pub epoch_length: u64,
    /// `Finalized`, `Safe` or `Latest`.
    pub default_block: BlockTag,
    /// Blocks subtracted from the head when `default_block` is `Latest`.
    pub finality_offset: u64,
    /// Widest `eth_getLogs` window.
    pub max_fetch_size: u64,
    pub retry: RetryPolicy,
    /// Wake-up interval when no head notification arrives.
    pub poll_interval: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            input_box_address: [0u8; 20],
            input_box_deployment_block: 0,
            epoch_length: 10,
            default_block: BlockTag::Finalized,
            finality_offset: 10,
            max_fetch_size: 10_000,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(7),
        }
    }
}

pub struct EvmReader {
    config: ReaderConfig,
    layout: EpochLayout,
    repo: Arc<dyn Repository>,
    client: Arc<dyn EthClient>,
    input_box: InputBox,
    metrics: Metrics,
    /// Highest head seen; the head may never go below it.
    last_head: Option<u64>,
}

impl EvmReader {
    pub fn new(
        config: ReaderConfig,
        repo: Arc<dyn Repository>,
        client: Arc<dyn EthClient>,
        metrics: Metrics,
    ) -> Self {
        let input_box = InputBox::new(config.input_box_address, Arc::clone(&client), config.retry);
        Self {
            layout: EpochLayout::new(config.epoch_length, config.input_box_deployment_block),
            config,
            repo,
            client,
            input_box,
            metrics,
            last_head: None,
        }
    }

    /// Run until shutdown. Returns the first error a pass hits.
    pub async fn run(
        mut self,
        mut heads: Option<mpsc::Receiver<u64>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ReaderError> {
        info!("[rn-03] EVM reader started");
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Err(e) = self.tick().await {
                error!(
                    service = Service::EvmReader.as_str(),
                    error_kind = e.error_kind(),
                    "[rn-03] Reader stopped: {}",
                    e
                );
                return Err(e);
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[rn-03] Shutdown signal received");
                    return Ok(());
                }
                head = next_head(&mut heads) => {
                    debug!(head, "[rn-03] New head");
                }
                _ = ticker.tick() => {}
            }
        }
    }

    /// One pass over every running application.
    pub async fn tick(&mut self) -> Result<(), ReaderError> {
        self.metrics.record_tick(Service::EvmReader);
        let head = self.resolve_head().await?;

        for app in self.repo.get_all_running_applications().await? {
            let start = app
                .last_processed_block
                .saturating_add(1)
                .max(self.config.input_box_deployment_block);
            if start <= head {
                self.read_inputs(&app, start, head).await?;
                self.verify_input_count(app.contract_address, head).await?;
            }
            self.watch_claim_acceptances(&app, head).await?;
            self.watch_output_executions(&app, head).await?;
        }
        Ok(())
    }

    /// The block the reader treats as final, checked for regression.
    async fn resolve_head(&mut self) -> Result<u64, ReaderError> {
        let tag = self.config.default_block;
        let header = self
            .config
            .retry
            .run("eth_getBlockByNumber", || self.client.header_by_tag(tag))
            .await?;
        let head = match tag {
            BlockTag::Latest => header.number.saturating_sub(self.config.finality_offset),
            _ => header.number,
        };

        if let Some(previous) = self.last_head {
            if head < previous {
                return Err(ReaderError::FinalizedRegression {
                    previous,
                    current: head,
                });
            }
        }
        self.last_head = Some(head);
        Ok(head)
    }

    /// Ingest `InputAdded` events for `app` in `[start, end]` and move its
    /// cursor to `end`. Returns the number of inputs stored.
    pub async fn read_inputs(
        &self,
        app: &Application,
        start: u64,
        end: u64,
    ) -> Result<usize, ReaderError> {
        let address = app.contract_address;
        let events = self
            .input_box
            .input_added_events(address, start, end, self.config.max_fetch_size)
            .await?;
        let count = events.len();

        let first_index = self.first_unsettled_epoch(app, start).await?;
        let batch = partition_inputs(address, self.layout, first_index, end, events)?;
        let closed = batch
            .iter()
            .filter(|entry| entry.epoch.status == EpochStatus::Closed)
            .count();

        self.repo.store_epochs_and_inputs(address, batch, end).await?;
        self.metrics.record_inputs_read(count as u64);

        if count > 0 || closed > 0 {
            info!(
                app = %to_hex(&address),
                inputs = count,
                closed_epochs = closed,
                "[rn-03] Read blocks {}..={}",
                start,
                end
            );
        } else {
            debug!(app = %to_hex(&address), "[rn-03] No inputs in {}..={}", start, end);
        }
        Ok(count)
    }

    /// The first epoch this pass must (re)assert: the stored epoch still
    /// open at the old cursor, or the epoch of `start`.
    async fn first_unsettled_epoch(
        &self,
        app: &Application,
        start: u64,
    ) -> Result<u64, ReaderError> {
        let address = app.contract_address;
        if self.repo.get_epoch(address, 0).await?.is_none() {
            return Ok(0);
        }
        if app.last_processed_block >= self.config.input_box_deployment_block {
            let previous = self.layout.index_of(app.last_processed_block);
            if let Some(epoch) = self.repo.get_epoch(address, previous).await? {
                if epoch.status == EpochStatus::Open {
                    return Ok(previous);
                }
            }
        }
        Ok(self.layout.index_of(start))
    }

    async fn verify_input_count(&self, app: Address, head: u64) -> Result<(), ReaderError> {
        let onchain = self
            .input_box
            .number_of_inputs(app, BlockTag::Number(head))
            .await?;
        let local = self.repo.get_input_count(app).await?;
        if onchain != local {
            return Err(ReaderError::InputCountMismatch {
                app,
                local,
                onchain,
                block: head,
            });
        }
        Ok(())
    }

    /// Move `claim_submitted` epochs whose claim the consensus accepted.
    async fn watch_claim_acceptances(
        &self,
        app: &Application,
        head: u64,
    ) -> Result<(), ReaderError> {
        let from = app
            .last_claim_check_block
            .saturating_add(1)
            .max(self.config.input_box_deployment_block);
        if from > head {
            return Ok(());
        }

        let consensus = ConsensusContract::new(
            app.iconsensus_address,
            Arc::clone(&self.client),
            self.config.retry,
        );
        let events = consensus
            .claim_acceptances(app.contract_address, from, head, self.config.max_fetch_size)
            .await?;
        for event in events {
            let accepted = self
                .repo
                .update_epoch_with_accepted_claim(
                    app.contract_address,
                    event.last_block,
                    event.claim_hash,
                    event.transaction_hash,
                )
                .await?;
            if accepted {
                info!(
                    app = %to_hex(&app.contract_address),
                    last_block = event.last_block,
                    "[rn-03] Claim accepted: {}",
                    to_hex(&event.claim_hash)
                );
            } else {
                warn!(
                    app = %to_hex(&app.contract_address),
                    last_block = event.last_block,
                    "[rn-03] Accepted claim {} matches no submitted epoch",
                    to_hex(&event.claim_hash)
                );
            }
        }

        self.repo
            .update_last_claim_check_block(app.contract_address, head)
            .await?;
        Ok(())
    }

    /// Record the L1 transaction of each executed output.
    async fn watch_output_executions(
        &self,
        app: &Application,
        head: u64,
    ) -> Result<(), ReaderError> {
        let from = app
            .last_output_check_block
            .saturating_add(1)
            .max(self.config.input_box_deployment_block);
        if from > head {
            return Ok(());
        }

        let contract = ApplicationContract::new(
            app.contract_address,
            Arc::clone(&self.client),
            self.config.retry,
        );
        let executions = contract
            .output_executions(from, head, self.config.max_fetch_size)
            .await?;
        for execution in executions {
            let known = self
                .repo
                .update_output_executed(
                    app.contract_address,
                    execution.output_index,
                    execution.transaction_hash,
                )
                .await?;
            if !known {
                warn!(
                    app = %to_hex(&app.contract_address),
                    "[rn-03] Executed output {} is not stored",
                    execution.output_index
                );
            }
        }

        self.repo
            .update_last_output_check_block(app.contract_address, head)
            .await?;
        Ok(())
    }
}

/// Next head notification; pends forever once the subscription is gone.
async fn next_head(heads: &mut Option<mpsc::Receiver<u64>>) -> u64 {
    if let Some(receiver) = heads.as_mut() {
        if let Some(head) = receiver.recv().await {
            return head;
        }
    }
    *heads = None;
    std::future::pending().await
}
