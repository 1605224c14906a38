//! # Claimer Service
//!
//! One pass (`tick`), per application with computed claims:
//!
//! 1. Scan `ClaimSubmission` events from the earliest pending claim's last
//!    block to the current head, in `max_fetch_size` windows
//! 2. Mark every pending claim found on chain as submitted with the
//!    transaction that carried it; a transaction that is not ours counts
//!    as a duplicate
//! 3. Submit every remaining claim that is not already in flight, then mark
//!    it submitted optimistically with our transaction hash
//!
//! Finally, in-flight entries older than `RESUBMIT_AFTER_BLOCKS` are dropped
//! so their claims can be sent again.
//!
//! A reverting `submitClaim` is logged and retried next pass. An unreachable
//! node aborts the pass before the repository is touched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use primitive_types::U256;
use rn_01_repository::Repository;
use rn_02_signer::{Eip1559Transaction, LegacyTransaction, Signer, Transaction};
use rollups_telemetry::{Metrics, Service};
use shared_l1::{BlockTag, CallRequest, ConsensusContract, EthClient, L1Error, RetryPolicy};
use shared_types::{to_hex, Address, ComputedClaim, Hash};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::domain::errors::ClaimerError;
use crate::domain::in_flight::{ClaimKey, InFlightClaims};

/// Claimer configuration
#[derive(Debug, Clone)]
pub struct ClaimerConfig {
    pub chain_id: u64,
    pub poll_interval: Duration,
    /// Widest `eth_getLogs` window.
    pub max_fetch_size: u64,
    pub retry: RetryPolicy,
}

impl Default for ClaimerConfig {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            poll_interval: Duration::from_secs(1),
            max_fetch_size: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimerTick {
    pub submitted: u64,
    pub reconciled: u64,
    pub duplicates: u64,
    pub reverted: u64,
}

pub struct Claimer {
    config: ClaimerConfig,
    repo: Arc<dyn Repository>,
    client: Arc<dyn EthClient>,
    signer: Arc<Signer>,
    metrics: Metrics,
    in_flight: InFlightClaims,
    /// Next nonce within the current pass, ahead of the node's pending
    /// count when it has not seen our last broadcast yet. Cleared every
    /// pass so nonces freed by dropped transactions are reused.
    next_nonce: Option<u64>,
}

impl Claimer {
    pub fn new(
        config: ClaimerConfig,
        repo: Arc<dyn Repository>,
        client: Arc<dyn EthClient>,
        signer: Arc<Signer>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            repo,
            client,
            signer,
            metrics,
            in_flight: InFlightClaims::new(),
            next_nonce: None,
        }
    }

    pub fn in_flight(&self) -> &InFlightClaims {
        &self.in_flight
    }

    /// Treat every computed claim as possibly in flight: a previous run may
    /// have broadcast it without recording the submission. Returns how many
    /// claims were restored.
    pub async fn restore_in_flight(&mut self) -> Result<usize, ClaimerError> {
        let current = self.current_block().await?;
        let claims = self.repo.select_computed_claims().await?;
        for claim in &claims {
            self.in_flight.track(ClaimKey::of(claim), current, None);
        }
        if !claims.is_empty() {
            info!(
                claims = claims.len(),
                block = current,
                "[rn-06] Restored possibly in-flight claims"
            );
        }
        Ok(claims.len())
    }

    /// Run until shutdown. Failed passes are logged and retried.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            signer = self.signer.kind(),
            address = %to_hex(&self.signer.address()),
            "[rn-06] Claimer started"
        );
        if let Err(e) = self.restore_in_flight().await {
            error!(
                service = Service::Claimer.as_str(),
                error_kind = e.error_kind(),
                "[rn-06] Could not restore in-flight claims: {}",
                e
            );
        }

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[rn-06] Shutdown signal received");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // Cancelling mid-pass may leave a broadcast transaction
            // unrecorded; the next start restores it as in flight and the
            // submission scan picks it up.
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[rn-06] Shutdown signal received");
                    return;
                }
                result = self.tick() => {
                    if let Err(e) = result {
                        error!(
                            service = Service::Claimer.as_str(),
                            error_kind = e.error_kind(),
                            "[rn-06] Claim pass failed: {}",
                            e
                        );
                    }
                }
            }
        }
    }

    pub async fn tick(&mut self) -> Result<ClaimerTick, ClaimerError> {
        self.metrics.record_tick(Service::Claimer);
        self.next_nonce = None;
        let current = self.current_block().await?;

        let mut by_app: BTreeMap<Address, Vec<ComputedClaim>> = BTreeMap::new();
        for claim in self.repo.select_computed_claims().await? {
            by_app.entry(claim.app_address).or_default().push(claim);
        }

        let mut summary = ClaimerTick::default();
        for (app, claims) in by_app {
            self.claim_application(app, claims, current, &mut summary)
                .await?;
        }

        let expired = self.in_flight.expire(current);
        if expired > 0 {
            warn!(
                expired,
                block = current,
                "[rn-06] In-flight claims unconfirmed, will resubmit"
            );
        }
        Ok(summary)
    }

    async fn claim_application(
        &mut self,
        app: Address,
        claims: Vec<ComputedClaim>,
        current: u64,
        summary: &mut ClaimerTick,
    ) -> Result<(), ClaimerError> {
        let Some(consensus_address) = claims.first().map(|claim| claim.iconsensus_address) else {
            return Ok(());
        };
        let consensus =
            ConsensusContract::new(consensus_address, Arc::clone(&self.client), self.config.retry);

        let mut pending: HashMap<ClaimKey, ComputedClaim> = claims
            .iter()
            .map(|claim| (ClaimKey::of(claim), claim.clone()))
            .collect();

        let from = claims.iter().map(|claim| claim.last_block).min().unwrap_or(current);
        if from <= current {
            let events = consensus
                .claim_submissions(app, from, current, self.config.max_fetch_size)
                .await?;
            for event in events {
                let key = ClaimKey {
                    app: event.app,
                    last_block: event.last_block,
                    claim_hash: event.claim_hash,
                };
                let Some(claim) = pending.remove(&key) else {
                    continue;
                };

                let ours = self.in_flight.is_ours(&key, &event.transaction_hash);
                self.repo
                    .update_epoch_with_submitted_claim(claim.epoch_id, event.transaction_hash)
                    .await?;
                self.in_flight.take(&key);
                summary.reconciled += 1;

                if ours {
                    debug!(
                        app = %to_hex(&app),
                        epoch = claim.epoch_index,
                        "[rn-06] Own submission confirmed"
                    );
                } else {
                    self.metrics.record_duplicate_claim();
                    summary.duplicates += 1;
                    info!(
                        app = %to_hex(&app),
                        epoch = claim.epoch_index,
                        transaction = %to_hex(&event.transaction_hash),
                        "[rn-06] Claim already submitted by another validator"
                    );
                }
            }
        }

        for claim in claims {
            let key = ClaimKey::of(&claim);
            if !pending.contains_key(&key) {
                continue;
            }
            if self.in_flight.contains(&key) {
                debug!(
                    app = %to_hex(&app),
                    epoch = claim.epoch_index,
                    "[rn-06] Claim in flight, waiting"
                );
                continue;
            }

            match self.submit(&claim, current).await? {
                Some(transaction_hash) => {
                    summary.submitted += 1;
                    if let Err(e) = self
                        .repo
                        .update_epoch_with_submitted_claim(claim.epoch_id, transaction_hash)
                        .await
                    {
                        warn!(
                            service = Service::Claimer.as_str(),
                            error_kind = e.error_kind(),
                            epoch = claim.epoch_index,
                            "[rn-06] Broadcast not recorded, leaving it to the submission scan: {}",
                            e
                        );
                    }
                }
                None => summary.reverted += 1,
            }
        }
        Ok(())
    }

    /// Sign and broadcast `submitClaim`. `None` when the call would revert.
    async fn submit(
        &mut self,
        claim: &ComputedClaim,
        current: u64,
    ) -> Result<Option<Hash>, ClaimerError> {
        let sender = self.signer.address();
        let calldata = ConsensusContract::submit_claim_calldata(
            claim.app_address,
            claim.last_block,
            claim.claim_hash,
        );
        let request = CallRequest::new(claim.iconsensus_address, calldata.clone()).from(sender);

        let estimate = match self.client.estimate_gas(&request).await {
            Ok(gas) => gas,
            Err(e @ L1Error::Rpc { .. }) => {
                self.metrics.record_submit_failure();
                warn!(
                    service = Service::Claimer.as_str(),
                    error_kind = e.error_kind(),
                    app = %to_hex(&claim.app_address),
                    epoch = claim.epoch_index,
                    "[rn-06] submitClaim would revert: {}",
                    e
                );
                return Ok(None);
            }
            Err(e) => {
                self.metrics.record_submit_failure();
                return Err(e.into());
            }
        };

        let nonce = self.next_nonce(sender).await?;
        let tx = self
            .build_transaction(nonce, estimate + estimate / 5, claim.iconsensus_address, calldata)
            .await?;
        let signed = self.signer.sign_transaction(&tx, self.config.chain_id).await?;

        let transaction_hash = match self.client.send_raw_transaction(&signed.raw).await {
            Ok(hash) => hash,
            Err(e) => {
                self.metrics.record_submit_failure();
                return Err(e.into());
            }
        };
        self.next_nonce = Some(nonce + 1);
        self.in_flight
            .track(ClaimKey::of(claim), current, Some(transaction_hash));
        self.metrics.record_claim_submitted();
        info!(
            app = %to_hex(&claim.app_address),
            epoch = claim.epoch_index,
            last_block = claim.last_block,
            claim = %to_hex(&claim.claim_hash),
            transaction = %to_hex(&transaction_hash),
            nonce,
            "[rn-06] Claim submitted"
        );
        Ok(Some(transaction_hash))
    }

    async fn next_nonce(&self, sender: Address) -> Result<u64, ClaimerError> {
        let onchain = self
            .config
            .retry
            .run("eth_getTransactionCount", || {
                self.client.transaction_count(sender, BlockTag::Pending)
            })
            .await?;
        if let Some(local) = self.next_nonce.filter(|local| *local > onchain) {
            debug!(onchain, local, "[rn-06] Node behind local nonce");
            return Ok(local);
        }
        Ok(onchain)
    }

    /// EIP-1559 when the head carries a base fee, legacy otherwise.
    async fn build_transaction(
        &self,
        nonce: u64,
        gas_limit: u64,
        to: Address,
        data: Vec<u8>,
    ) -> Result<Transaction, ClaimerError> {
        let retry = self.config.retry;
        let head = retry
            .run("eth_getBlockByNumber", || {
                self.client.header_by_tag(BlockTag::Latest)
            })
            .await?;

        let tx = match head.base_fee_per_gas {
            Some(base_fee) => {
                let tip = retry
                    .run("eth_maxPriorityFeePerGas", || {
                        self.client.max_priority_fee_per_gas()
                    })
                    .await?;
                Transaction::Eip1559(Eip1559Transaction {
                    nonce,
                    max_priority_fee_per_gas: tip,
                    max_fee_per_gas: base_fee.saturating_mul(U256::from(2u64)).saturating_add(tip),
                    gas_limit,
                    to,
                    value: U256::zero(),
                    data,
                })
            }
            None => {
                let gas_price = retry
                    .run("eth_gasPrice", || self.client.gas_price())
                    .await?;
                Transaction::Legacy(LegacyTransaction {
                    nonce,
                    gas_price,
                    gas_limit,
                    to,
                    value: U256::zero(),
                    data,
                })
            }
        };
        Ok(tx)
    }

    async fn current_block(&self) -> Result<u64, ClaimerError> {
        Ok(self
            .config
            .retry
            .run("eth_blockNumber", || self.client.block_number())
            .await?)
    }
}
