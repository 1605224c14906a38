//! # Validator Service
//!
//! One pass (`tick`) walks every running application's epochs in index
//! order and computes a claim for each one in `processed_all_inputs`:
//!
//! 1. Wait until every input up to the epoch's last block is processed and
//!    collect the outputs they produced (the cumulative leaf set)
//! 2. Build the output tree and prove the epoch's own outputs
//! 3. Bind the root to the machine hash of the epoch's last input
//! 4. Compare with the outputs hash the machine reported for that input
//! 5. Store the claim and the proofs in one repository write
//!
//! An epoch without inputs inherits the previous epoch's claim, or the
//! empty-tree claim when it is epoch 0. While that previous claim is not
//! computed yet the application's pass stops at the empty epoch and picks
//! it up on a later pass.
//!
//! A rejected input rolls the machine back, so an input stored without a
//! machine hash binds the claim to the nearest earlier input that has one,
//! or to the application's template hash.
//!
//! A failed epoch stops its application for this pass; other applications
//! still run.

use std::sync::Arc;
use std::time::Duration;

use rn_01_repository::{wait_for_outputs_in_block_range, Repository};
use rollups_telemetry::{Metrics, Service};
use shared_types::{to_hex, Address, Epoch, EpochStatus, Hash, Input};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::domain::claims::{compute_epoch_claim, empty_outputs_root};
use crate::domain::errors::ValidatorError;

/// Validator configuration
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub poll_interval: Duration,
    /// Compare computed claims with the machine's reported outputs hash.
    pub machine_hash_check: bool,
    /// Poll interval of the output waiter.
    pub wait_poll_interval: Duration,
    pub wait_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            machine_hash_check: true,
            wait_poll_interval: Duration::from_millis(100),
            wait_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Validator {
    config: ValidatorConfig,
    repo: Arc<dyn Repository>,
    metrics: Metrics,
}

impl Validator {
    pub fn new(config: ValidatorConfig, repo: Arc<dyn Repository>, metrics: Metrics) -> Self {
        Self {
            config,
            repo,
            metrics,
        }
    }

    /// Run until shutdown. Failed passes are logged; a claim mismatch keeps
    /// failing on every pass until an operator intervenes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            machine_hash_check = self.config.machine_hash_check,
            "[rn-05] Validator started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[rn-05] Shutdown signal received");
                    return;
                }
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[rn-05] Shutdown signal received");
                    return;
                }
                result = self.tick() => {
                    if let Err(e) = result {
                        error!(
                            service = Service::Validator.as_str(),
                            error_kind = e.error_kind(),
                            "[rn-05] Validation pass failed: {}",
                            e
                        );
                    }
                }
            }
        }
    }

    /// One pass over every running application. Returns the number of
    /// claims computed, or the first application error once every
    /// application has been tried.
    pub async fn tick(&self) -> Result<u64, ValidatorError> {
        self.metrics.record_tick(Service::Validator);

        let mut computed = 0;
        let mut first_error = None;
        for app in self.repo.get_all_running_applications().await? {
            match self.validate_application(app.contract_address).await {
                Ok(count) => computed += count,
                Err(e) => {
                    error!(
                        service = Service::Validator.as_str(),
                        error_kind = e.error_kind(),
                        app = %to_hex(&app.contract_address),
                        "[rn-05] Application halted: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(computed),
        }
    }

    async fn validate_application(&self, app: Address) -> Result<u64, ValidatorError> {
        let epochs = self.repo.get_processed_epochs(app).await?;
        let mut previous_claim: Option<Hash> = None;
        let mut computed = 0;

        for epoch in epochs {
            if epoch.status == EpochStatus::ProcessedAllInputs {
                let Some(claim) = self.compute_claim(&epoch, previous_claim).await? else {
                    debug!(
                        app = %to_hex(&app),
                        epoch = epoch.index,
                        "[rn-05] Previous epoch has no claim yet, waiting"
                    );
                    break;
                };
                computed += 1;
                previous_claim = Some(claim);
            } else {
                previous_claim = epoch.claim_hash;
            }
        }
        Ok(computed)
    }

    /// Compute, check and store the claim of one epoch. `None` when the
    /// epoch is empty and the claim it inherits is not computed yet.
    async fn compute_claim(
        &self,
        epoch: &Epoch,
        previous_claim: Option<Hash>,
    ) -> Result<Option<Hash>, ValidatorError> {
        let app = epoch.application_address;

        let Some(last_input) = self.repo.get_last_input(epoch).await? else {
            let Some(claim) = self.empty_epoch_claim(epoch, previous_claim).await? else {
                return Ok(None);
            };
            self.repo
                .set_epoch_claim_and_insert_proofs(epoch, claim, &[])
                .await?;
            self.record(epoch, claim, 0);
            return Ok(Some(claim));
        };

        let cumulative = wait_for_outputs_in_block_range(
            self.repo.as_ref(),
            app,
            0,
            epoch.last_block,
            self.config.wait_poll_interval,
            self.config.wait_timeout,
        )
        .await?;
        let own = self
            .repo
            .get_outputs_produced_in_block_range(app, epoch.first_block, epoch.last_block)
            .await?;

        let machine_hash = self.machine_hash_after(&last_input).await?;
        let claim = compute_epoch_claim(&cumulative, &own, &machine_hash)?;

        if self.config.machine_hash_check {
            let reported = self.repo.get_last_input_outputs_hash(epoch).await?;
            if reported != Some(claim.claim_hash) {
                return Err(ValidatorError::ClaimMismatch {
                    app,
                    epoch_index: epoch.index,
                    computed: claim.claim_hash,
                    reported,
                });
            }
        }

        self.repo
            .set_epoch_claim_and_insert_proofs(epoch, claim.claim_hash, &claim.proven)
            .await?;
        self.record(epoch, claim.claim_hash, claim.proven.len());
        Ok(Some(claim.claim_hash))
    }

    /// Machine hash after `input` was processed. Walks back over inputs
    /// stored without one until an input or the template provides it.
    async fn machine_hash_after(&self, input: &Input) -> Result<Hash, ValidatorError> {
        if let Some(hash) = input.machine_hash {
            return Ok(hash);
        }
        let app = input.application_address;

        let mut index = input.index;
        while index > 0 {
            index -= 1;
            let Some(earlier) = self.repo.get_input(app, index).await? else {
                break;
            };
            if let Some(hash) = earlier.machine_hash {
                debug!(
                    input = input.index,
                    from_input = index,
                    "[rn-05] Machine hash carried over from earlier input"
                );
                return Ok(hash);
            }
        }

        debug!(input = input.index, "[rn-05] Machine hash taken from template");
        self.repo
            .get_application(app)
            .await?
            .map(|application| application.template_hash)
            .ok_or(ValidatorError::MissingMachineHash {
                app,
                input_index: input.index,
            })
    }

    /// An epoch without inputs adds no outputs and does not move the
    /// machine, so its claim is the one before it. Epoch 0 has none before
    /// it and claims the empty tree.
    async fn empty_epoch_claim(
        &self,
        epoch: &Epoch,
        previous_claim: Option<Hash>,
    ) -> Result<Option<Hash>, ValidatorError> {
        if epoch.index == 0 {
            return Ok(Some(empty_outputs_root()));
        }
        if previous_claim.is_some() {
            return Ok(previous_claim);
        }
        Ok(self
            .repo
            .get_previous_epoch(epoch)
            .await?
            .and_then(|previous| previous.claim_hash))
    }

    fn record(&self, epoch: &Epoch, claim: Hash, proofs: usize) {
        self.metrics.record_claim_computed();
        info!(
            app = %to_hex(&epoch.application_address),
            epoch = epoch.index,
            last_block = epoch.last_block,
            claim = %to_hex(&claim),
            "[rn-05] Claim computed"
        );
        debug!(epoch = epoch.index, proofs, "[rn-05] Output proofs stored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::claims::claim_hash;
    use rn_01_repository::InMemoryRepository;
    use shared_crypto::{compute_root_from_siblings, keccak256, MerkleTree, MAX_OUTPUT_TREE_HEIGHT};
    use shared_types::{
        AdvanceResult, Application, EpochInputs, Input, InputCompletionStatus, ZERO_HASH,
    };

    const APP: Address = [0xaa; 20];

    /// Repository seeded epoch by epoch, advanced the way the echo machine
    /// does it: one output per input, chained machine hash.
    struct Chain {
        repo: Arc<InMemoryRepository>,
        leaves: Vec<Hash>,
        machine_hash: Hash,
        next_input: u64,
        next_epoch: u64,
    }

    impl Chain {
        async fn new() -> Self {
            let repo = Arc::new(InMemoryRepository::new());
            repo.insert_application(&Application::new(APP, [0x01; 32], [0xcc; 20]))
                .await
                .unwrap();
            Self {
                repo,
                leaves: Vec::new(),
                machine_hash: ZERO_HASH,
                next_input: 0,
                next_epoch: 0,
            }
        }

        /// Store a closed epoch with `payloads`, advance them and promote it.
        async fn epoch(&mut self, payloads: &[&[u8]]) {
            self.epoch_with(payloads, None).await
        }

        async fn epoch_with(&mut self, payloads: &[&[u8]], forged_outputs_hash: Option<Hash>) {
            let epoch = Epoch {
                status: EpochStatus::Closed,
                ..Epoch::at_index(APP, self.next_epoch, 5, 16)
            };
            let inputs: Vec<Input> = payloads
                .iter()
                .enumerate()
                .map(|(offset, payload)| {
                    Input::unprocessed(
                        APP,
                        self.next_input + offset as u64,
                        epoch.first_block,
                        payload.to_vec(),
                        ZERO_HASH,
                    )
                })
                .collect();
            let last_block = epoch.last_block;
            self.repo
                .store_epochs_and_inputs(APP, vec![EpochInputs { epoch, inputs }], last_block + 1)
                .await
                .unwrap();

            for payload in payloads.iter().copied() {
                let input = self
                    .repo
                    .get_input(APP, self.next_input)
                    .await
                    .unwrap()
                    .unwrap();
                self.leaves.push(keccak256(payload));
                self.machine_hash = keccak256(&[self.machine_hash.as_slice(), payload].concat());
                let root = MerkleTree::build(self.leaves.clone(), MAX_OUTPUT_TREE_HEIGHT)
                    .unwrap()
                    .root();
                let result = AdvanceResult {
                    status: InputCompletionStatus::Accepted,
                    outputs: vec![payload.to_vec()],
                    reports: Vec::new(),
                    outputs_hash: forged_outputs_hash
                        .unwrap_or_else(|| claim_hash(&root, &self.machine_hash)),
                    machine_hash: Some(self.machine_hash),
                };
                self.repo.store_advance_result(&input, &result).await.unwrap();
                self.next_input += 1;
            }
            self.repo.promote_closed_epochs_fully_processed(APP).await.unwrap();
            self.next_epoch += 1;
        }

        /// Store a closed epoch with one input the machine rejected without
        /// reporting a machine hash, and promote it.
        async fn rejected_epoch(&mut self, payload: &[u8]) {
            let epoch = Epoch {
                status: EpochStatus::Closed,
                ..Epoch::at_index(APP, self.next_epoch, 5, 16)
            };
            let input = Input::unprocessed(
                APP,
                self.next_input,
                epoch.first_block,
                payload.to_vec(),
                ZERO_HASH,
            );
            let last_block = epoch.last_block;
            self.repo
                .store_epochs_and_inputs(
                    APP,
                    vec![EpochInputs {
                        epoch,
                        inputs: vec![input],
                    }],
                    last_block + 1,
                )
                .await
                .unwrap();

            let input = self
                .repo
                .get_input(APP, self.next_input)
                .await
                .unwrap()
                .unwrap();
            let result = AdvanceResult {
                status: InputCompletionStatus::Rejected,
                outputs: Vec::new(),
                reports: Vec::new(),
                outputs_hash: [0xee; 32],
                machine_hash: None,
            };
            self.repo.store_advance_result(&input, &result).await.unwrap();
            self.repo.promote_closed_epochs_fully_processed(APP).await.unwrap();
            self.next_input += 1;
            self.next_epoch += 1;
        }

        fn outputs_root(&self) -> Hash {
            MerkleTree::build(self.leaves.clone(), MAX_OUTPUT_TREE_HEIGHT)
                .unwrap()
                .root()
        }

        fn validator(&self, machine_hash_check: bool) -> Validator {
            let config = ValidatorConfig {
                machine_hash_check,
                wait_timeout: Duration::from_millis(200),
                ..ValidatorConfig::default()
            };
            Validator::new(config, self.repo.clone(), Metrics::new().unwrap())
        }

        async fn epoch_at(&self, index: u64) -> Epoch {
            self.repo.get_epoch(APP, index).await.unwrap().unwrap()
        }

        async fn all_outputs(&self) -> Vec<shared_types::Output> {
            self.repo
                .get_outputs_produced_in_block_range(APP, 0, u64::MAX)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_claim_commits_to_outputs_and_machine_hash() {
        let mut chain = Chain::new().await;
        chain.epoch(&[b"one", b"two"]).await;

        assert_eq!(chain.validator(true).tick().await.unwrap(), 1);

        let epoch = chain.epoch_at(0).await;
        assert_eq!(epoch.status, EpochStatus::ClaimComputed);
        let root = MerkleTree::build(chain.leaves.clone(), MAX_OUTPUT_TREE_HEIGHT)
            .unwrap()
            .root();
        assert_eq!(epoch.claim_hash, Some(claim_hash(&root, &chain.machine_hash)));

        let outputs = chain.all_outputs().await;
        assert_eq!(outputs.len(), 2);
        for output in outputs {
            let leaf = output.hash.unwrap();
            assert_eq!(output.output_hashes_siblings.len(), MAX_OUTPUT_TREE_HEIGHT);
            assert_eq!(
                compute_root_from_siblings(leaf, output.index, &output.output_hashes_siblings),
                root
            );
        }
    }

    #[tokio::test]
    async fn test_empty_epoch_reuses_previous_claim() {
        let mut chain = Chain::new().await;
        chain.epoch(&[b"only"]).await;
        chain.epoch(&[]).await;

        assert_eq!(chain.validator(true).tick().await.unwrap(), 2);

        let first = chain.epoch_at(0).await;
        let second = chain.epoch_at(1).await;
        assert_eq!(second.status, EpochStatus::ClaimComputed);
        assert!(first.claim_hash.is_some());
        assert_eq!(second.claim_hash, first.claim_hash);
        assert_eq!(chain.all_outputs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_epoch_after_earlier_pass() {
        let mut chain = Chain::new().await;
        chain.epoch(&[b"only"]).await;
        chain.validator(true).tick().await.unwrap();
        chain.epoch(&[]).await;

        assert_eq!(chain.validator(true).tick().await.unwrap(), 1);
        assert_eq!(
            chain.epoch_at(1).await.claim_hash,
            chain.epoch_at(0).await.claim_hash
        );
    }

    #[tokio::test]
    async fn test_empty_first_epoch_claims_empty_tree() {
        let mut chain = Chain::new().await;
        chain.epoch(&[]).await;

        chain.validator(true).tick().await.unwrap();

        let epoch = chain.epoch_at(0).await;
        assert_eq!(epoch.claim_hash, Some(empty_outputs_root()));
    }

    #[tokio::test]
    async fn test_later_epoch_root_covers_earlier_outputs() {
        let mut chain = Chain::new().await;
        chain.epoch(&[b"early"]).await;
        chain.epoch(&[b"late"]).await;

        assert_eq!(chain.validator(true).tick().await.unwrap(), 2);

        let root = MerkleTree::build(chain.leaves.clone(), MAX_OUTPUT_TREE_HEIGHT)
            .unwrap()
            .root();
        assert_eq!(
            chain.epoch_at(1).await.claim_hash,
            Some(claim_hash(&root, &chain.machine_hash))
        );
        let late = chain
            .all_outputs()
            .await
            .into_iter()
            .find(|output| output.index == 1)
            .unwrap();
        assert_eq!(
            compute_root_from_siblings(late.hash.unwrap(), 1, &late.output_hashes_siblings),
            root
        );
    }

    #[tokio::test]
    async fn test_claim_mismatch_halts_application() {
        let mut chain = Chain::new().await;
        let mut forged = [0u8; 32];
        forged[..4].copy_from_slice(&[0xca, 0xfe, 0xba, 0xbe]);
        chain.epoch_with(&[b"payload"], Some(forged)).await;

        let err = chain.validator(true).tick().await.unwrap_err();
        assert!(err.to_string().contains("claim does not match"));
        assert_eq!(err.error_kind(), "claim_mismatch");

        let epoch = chain.epoch_at(0).await;
        assert_eq!(epoch.status, EpochStatus::ProcessedAllInputs);
        assert_eq!(epoch.claim_hash, None);
        assert!(chain.all_outputs().await[0].hash.is_none());
    }

    #[tokio::test]
    async fn test_disabled_check_accepts_reported_mismatch() {
        let mut chain = Chain::new().await;
        chain.epoch_with(&[b"payload"], Some([0xee; 32])).await;

        assert_eq!(chain.validator(false).tick().await.unwrap(), 1);
        assert_eq!(chain.epoch_at(0).await.status, EpochStatus::ClaimComputed);
    }

    #[tokio::test]
    async fn test_rejected_input_without_machine_hash_uses_template() {
        let mut chain = Chain::new().await;
        chain.rejected_epoch(b"bad").await;

        let validator = chain.validator(false);
        assert_eq!(validator.tick().await.unwrap(), 1);

        let epoch = chain.epoch_at(0).await;
        assert_eq!(epoch.status, EpochStatus::ClaimComputed);
        assert_eq!(
            epoch.claim_hash,
            Some(claim_hash(&empty_outputs_root(), &[0x01; 32]))
        );
    }

    #[tokio::test]
    async fn test_rejected_input_without_machine_hash_uses_earlier_input() {
        let mut chain = Chain::new().await;
        chain.epoch(&[b"good"]).await;
        chain.rejected_epoch(b"bad").await;

        assert_eq!(chain.validator(false).tick().await.unwrap(), 2);

        let epoch = chain.epoch_at(1).await;
        assert_eq!(epoch.status, EpochStatus::ClaimComputed);
        assert_eq!(
            epoch.claim_hash,
            Some(claim_hash(&chain.outputs_root(), &chain.machine_hash))
        );
    }

    #[tokio::test]
    async fn test_empty_epoch_waits_for_previous_claim() {
        let chain = Chain::new().await;
        let first = Epoch {
            status: EpochStatus::Closed,
            ..Epoch::at_index(APP, 0, 5, 16)
        };
        let second = Epoch {
            status: EpochStatus::Closed,
            ..Epoch::at_index(APP, 1, 5, 16)
        };
        chain
            .repo
            .store_epochs_and_inputs(
                APP,
                vec![
                    EpochInputs {
                        epoch: first,
                        inputs: vec![Input::unprocessed(APP, 0, 17, b"x".to_vec(), ZERO_HASH)],
                    },
                    EpochInputs {
                        epoch: second,
                        inputs: Vec::new(),
                    },
                ],
                26,
            )
            .await
            .unwrap();
        chain.repo.promote_closed_epochs_fully_processed(APP).await.unwrap();
        assert_eq!(chain.epoch_at(1).await.status, EpochStatus::ProcessedAllInputs);

        let validator = chain.validator(false);
        assert_eq!(validator.tick().await.unwrap(), 0);
        assert_eq!(validator.tick().await.unwrap(), 0);
        assert_eq!(chain.epoch_at(1).await.claim_hash, None);

        let input = chain.repo.get_input(APP, 0).await.unwrap().unwrap();
        let result = AdvanceResult {
            status: InputCompletionStatus::Accepted,
            outputs: Vec::new(),
            reports: Vec::new(),
            outputs_hash: ZERO_HASH,
            machine_hash: Some([0x02; 32]),
        };
        chain.repo.store_advance_result(&input, &result).await.unwrap();
        chain.repo.promote_closed_epochs_fully_processed(APP).await.unwrap();

        assert_eq!(validator.tick().await.unwrap(), 2);
        let claim = Some(claim_hash(&empty_outputs_root(), &[0x02; 32]));
        assert_eq!(chain.epoch_at(0).await.claim_hash, claim);
        assert_eq!(chain.epoch_at(1).await.claim_hash, claim);
    }

    #[tokio::test]
    async fn test_closed_epochs_are_left_alone() {
        let chain = Chain::new().await;
        let epoch = Epoch {
            status: EpochStatus::Closed,
            ..Epoch::at_index(APP, 0, 5, 16)
        };
        chain
            .repo
            .store_epochs_and_inputs(
                APP,
                vec![EpochInputs {
                    epoch,
                    inputs: vec![Input::unprocessed(APP, 0, 17, b"x".to_vec(), ZERO_HASH)],
                }],
                21,
            )
            .await
            .unwrap();

        assert_eq!(chain.validator(true).tick().await.unwrap(), 0);
        assert_eq!(chain.epoch_at(0).await.status, EpochStatus::Closed);
    }
}
