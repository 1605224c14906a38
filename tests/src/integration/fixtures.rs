//! # Node Harness
//!
//! Every worker over shared in-memory infrastructure, stepped by hand so
//! scenarios stay deterministic. Epochs are 5 blocks long starting at block
//! 16, and the reader trails the latest block by one.

use std::sync::Arc;
use std::time::Duration;

use rn_01_repository::{InMemoryRepository, Repository};
use rn_02_signer::Signer;
use rn_03_evm_reader::{EvmReader, ReaderConfig};
use rn_04_advancer::{Advancer, AdvancerConfig, MockMachine};
use rn_05_validator::{Validator, ValidatorConfig};
use rn_06_claimer::{Claimer, ClaimerConfig};
use rollups_telemetry::Metrics;
use shared_l1::{BlockTag, ClaimEvent, InputAdded, MockEthClient, RetryPolicy};
use shared_types::{Address, Application, Epoch, Hash};

pub const INPUT_BOX: Address = [0x11; 20];
pub const APP: Address = [0xaa; 20];
pub const CONSENSUS: Address = [0xcc; 20];
pub const TEMPLATE: Hash = [0x7e; 32];
pub const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const CHAIN_ID: u64 = 31337;

pub const EPOCH_LENGTH: u64 = 5;
pub const DEPLOYMENT_BLOCK: u64 = 16;
pub const FINALITY_OFFSET: u64 = 1;

pub struct Node {
    pub repo: Arc<InMemoryRepository>,
    pub chain: Arc<MockEthClient>,
    pub machines: Arc<MockMachine>,
    pub metrics: Metrics,
    pub reader: EvmReader,
    pub advancer: Advancer,
    pub validator: Validator,
    pub claimer: Claimer,
    emitted: u64,
}

impl Node {
    /// A node signing with the first Hardhat account.
    pub async fn start() -> Self {
        Self::with_signer(Signer::from_private_key(HARDHAT_KEY).unwrap()).await
    }

    pub async fn with_signer(signer: Signer) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_application(&Application::new(APP, TEMPLATE, CONSENSUS))
            .await
            .unwrap();
        let chain = Arc::new(MockEthClient::new().with_chain_id(CHAIN_ID));
        let machines = Arc::new(MockMachine::new([APP]));
        let metrics = Metrics::new().unwrap();

        let reader = EvmReader::new(
            ReaderConfig {
                input_box_address: INPUT_BOX,
                input_box_deployment_block: DEPLOYMENT_BLOCK,
                epoch_length: EPOCH_LENGTH,
                default_block: BlockTag::Latest,
                finality_offset: FINALITY_OFFSET,
                max_fetch_size: 100,
                retry: RetryPolicy::none(),
                poll_interval: Duration::from_millis(10),
            },
            repo.clone(),
            chain.clone(),
            metrics.clone(),
        );
        let advancer = Advancer::new(
            AdvancerConfig {
                poll_interval: Duration::from_millis(10),
            },
            repo.clone(),
            machines.clone(),
            metrics.clone(),
        );
        let validator = Validator::new(
            ValidatorConfig {
                poll_interval: Duration::from_millis(10),
                machine_hash_check: true,
                wait_poll_interval: Duration::from_millis(5),
                wait_timeout: Duration::from_secs(1),
            },
            repo.clone(),
            metrics.clone(),
        );
        let claimer = Claimer::new(
            ClaimerConfig {
                chain_id: CHAIN_ID,
                poll_interval: Duration::from_millis(10),
                max_fetch_size: 100,
                retry: RetryPolicy::none(),
            },
            repo.clone(),
            chain.clone(),
            Arc::new(signer),
            metrics.clone(),
        );

        let node = Self {
            repo,
            chain,
            machines,
            metrics,
            reader,
            advancer,
            validator,
            claimer,
            emitted: 0,
        };
        node.set_onchain_input_count(0);
        node
    }

    fn set_onchain_input_count(&self, count: u64) {
        self.chain.set_number_of_inputs(INPUT_BOX, count);
    }

    /// Emit an `InputAdded` for [`APP`] and bump the on-chain input count.
    pub fn emit(&mut self, block: u64, log_index: u64, payload: &[u8]) {
        let event = InputAdded {
            app: APP,
            index: self.emitted,
            sender: [0x99; 20],
            input: payload.to_vec(),
            block_number: block,
            log_index,
            transaction_hash: [self.emitted as u8 + 1; 32],
        };
        self.chain.push_log(event.to_log(INPUT_BOX));
        self.emitted += 1;
        self.set_onchain_input_count(self.emitted);
    }

    /// Move the chain head. The reader settles `block - FINALITY_OFFSET`.
    pub fn set_latest(&self, block: u64) {
        self.chain.set_latest(block);
    }

    /// One polling interval: every worker ticks once, in pipeline order.
    pub async fn step(&mut self) {
        self.reader.tick().await.unwrap();
        self.advancer.tick().await.unwrap();
        self.validator.tick().await.unwrap();
        self.claimer.tick().await.unwrap();
    }

    /// Reader, advancer and validator only.
    pub async fn compute_claims(&mut self) {
        self.reader.tick().await.unwrap();
        self.advancer.tick().await.unwrap();
        self.validator.tick().await.unwrap();
    }

    pub async fn epoch(&self, index: u64) -> Epoch {
        self.repo.get_epoch(APP, index).await.unwrap().unwrap()
    }

    /// A `ClaimSubmission` mined at `block` in `transaction`.
    pub fn claim_submitted_on_chain(&self, claim: Hash, last_block: u64, block: u64, transaction: Hash) {
        self.chain.push_log(
            claim_event(claim, last_block, block, transaction).to_submission_log(CONSENSUS),
        );
    }

    /// A `ClaimAcceptance` mined at `block` in `transaction`.
    pub fn claim_accepted_on_chain(&self, claim: Hash, last_block: u64, block: u64, transaction: Hash) {
        self.chain.push_log(
            claim_event(claim, last_block, block, transaction).to_acceptance_log(CONSENSUS),
        );
    }
}

fn claim_event(claim: Hash, last_block: u64, block: u64, transaction: Hash) -> ClaimEvent {
    ClaimEvent {
        app: APP,
        claim_hash: claim,
        last_block,
        block_number: block,
        log_index: 0,
        transaction_hash: transaction,
    }
}
