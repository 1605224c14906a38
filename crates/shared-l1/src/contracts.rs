//! # Contract Bindings
//!
//! Typed wrappers over the InputBox, IConsensus and Application contracts.
//! Every chain access goes through the binding's [`RetryPolicy`]; log scans
//! are split into windows of at most `max_fetch_size` blocks so providers
//! with range limits accept them.

use std::sync::Arc;

use alloy_primitives::{B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use shared_types::{Address, Hash};
use tracing::debug;

use crate::client::EthClient;
use crate::errors::L1Error;
use crate::retry::RetryPolicy;
use crate::types::{BlockTag, CallRequest, Log, LogFilter};

sol! {
    interface IInputBox {
        event InputAdded(address indexed dapp, uint256 indexed inputIndex, address sender, bytes input);

        function getNumberOfInputs(address dapp) external view returns (uint256);
        function getInputHash(address dapp, uint256 index) external view returns (bytes32);
    }

    interface IConsensus {
        event ClaimSubmission(address indexed app, bytes32 claimHash, uint256 lastBlock);
        event ClaimAcceptance(address indexed app, bytes32 claimHash, uint256 lastBlock);

        function submitClaim(address app, uint256 lastBlock, bytes32 claimHash) external;
    }

    interface IApplication {
        event OutputExecuted(uint64 outputIndex, bytes output);

        function getTemplateHash() external view returns (bytes32);
    }
}

/// Fetch logs matching `address`/`topics` over `[from, to]`, one window of at
/// most `max_fetch_size` blocks at a time.
pub async fn scan_logs(
    client: &dyn EthClient,
    retry: RetryPolicy,
    address: Address,
    topics: Vec<Option<Hash>>,
    from: u64,
    to: u64,
    max_fetch_size: u64,
) -> Result<Vec<Log>, L1Error> {
    let window = max_fetch_size.max(1);
    let mut logs = Vec::new();
    let mut start = from;

    while start <= to {
        let end = start.saturating_add(window - 1).min(to);
        let filter = LogFilter {
            address,
            topics: topics.clone(),
            from_block: start,
            to_block: end,
        };
        let mut chunk = retry
            .run("eth_getLogs", || client.get_logs(&filter))
            .await?;
        debug!(from = start, to = end, found = chunk.len(), "Scanned log window");
        logs.append(&mut chunk);

        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }

    logs.sort_by_key(|log| (log.block_number, log.log_index));
    Ok(logs)
}

fn decode_log<E: SolEvent>(log: &Log) -> Result<E, L1Error> {
    let topics = log.topics.iter().map(|topic| B256::from(*topic));
    Ok(E::decode_raw_log(topics, &log.data, true)?)
}

fn encode_log<E: SolEvent>(
    event: &E,
    address: Address,
    block_number: u64,
    log_index: u64,
    transaction_hash: Hash,
) -> Log {
    let encoded = event.encode_log_data();
    Log {
        address,
        topics: encoded.topics().iter().map(|topic| topic.0).collect(),
        data: encoded.data.to_vec(),
        block_number,
        log_index,
        transaction_hash,
    }
}

/// Topic filter: the event signature, then the indexed application.
fn app_topics<E: SolEvent>(app: Address) -> Vec<Option<Hash>> {
    vec![Some(E::SIGNATURE_HASH.0), Some(address_topic(app))]
}

fn address_topic(address: Address) -> Hash {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(&address);
    topic
}

fn to_u64(value: U256, field: &str) -> Result<u64, L1Error> {
    if value > U256::from(u64::MAX) {
        return Err(L1Error::Decode(format!("{field} {value} does not fit in u64")));
    }
    Ok(value.as_limbs()[0])
}

fn from_sol_address(address: alloy_primitives::Address) -> Address {
    address.0 .0
}

// =============================================================================
// INPUT BOX
// =============================================================================

/// A decoded `InputAdded` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAdded {
    pub app: Address,
    pub index: u64,
    pub sender: Address,
    pub input: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash,
}

impl InputAdded {
    pub fn decode(log: &Log) -> Result<Self, L1Error> {
        let event: IInputBox::InputAdded = decode_log(log)?;
        Ok(Self {
            app: from_sol_address(event.dapp),
            index: to_u64(event.inputIndex, "input index")?,
            sender: from_sol_address(event.sender),
            input: event.input.to_vec(),
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        })
    }

    /// The log an InputBox at `input_box` emits for this event.
    pub fn to_log(&self, input_box: Address) -> Log {
        let event = IInputBox::InputAdded {
            dapp: self.app.into(),
            inputIndex: U256::from(self.index),
            sender: self.sender.into(),
            input: self.input.clone().into(),
        };
        encode_log(
            &event,
            input_box,
            self.block_number,
            self.log_index,
            self.transaction_hash,
        )
    }
}

#[derive(Clone)]
pub struct InputBox {
    address: Address,
    client: Arc<dyn EthClient>,
    retry: RetryPolicy,
}

impl InputBox {
    pub fn new(address: Address, client: Arc<dyn EthClient>, retry: RetryPolicy) -> Self {
        Self {
            address,
            client,
            retry,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `InputAdded` events for `app` in `[from, to]`, in emission order.
    pub async fn input_added_events(
        &self,
        app: Address,
        from: u64,
        to: u64,
        max_fetch_size: u64,
    ) -> Result<Vec<InputAdded>, L1Error> {
        scan_logs(
            self.client.as_ref(),
            self.retry,
            self.address,
            app_topics::<IInputBox::InputAdded>(app),
            from,
            to,
            max_fetch_size,
        )
        .await?
        .iter()
        .map(InputAdded::decode)
        .collect()
    }

    /// `getNumberOfInputs(app)` evaluated at `block`.
    pub async fn number_of_inputs(&self, app: Address, block: BlockTag) -> Result<u64, L1Error> {
        let call = IInputBox::getNumberOfInputsCall { dapp: app.into() };
        let request = CallRequest::new(self.address, call.abi_encode());
        let out = self
            .retry
            .run("getNumberOfInputs", || self.client.call(&request, block))
            .await?;
        let count = IInputBox::getNumberOfInputsCall::abi_decode_returns(&out, true)?._0;
        to_u64(count, "input count")
    }

    /// `getInputHash(app, index)` evaluated at `block`.
    pub async fn input_hash(
        &self,
        app: Address,
        index: u64,
        block: BlockTag,
    ) -> Result<Hash, L1Error> {
        let call = IInputBox::getInputHashCall {
            dapp: app.into(),
            index: U256::from(index),
        };
        let request = CallRequest::new(self.address, call.abi_encode());
        let out = self
            .retry
            .run("getInputHash", || self.client.call(&request, block))
            .await?;
        Ok(IInputBox::getInputHashCall::abi_decode_returns(&out, true)?._0.0)
    }
}

// =============================================================================
// CONSENSUS
// =============================================================================

/// A decoded `ClaimSubmission` or `ClaimAcceptance` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimEvent {
    pub app: Address,
    pub claim_hash: Hash,
    pub last_block: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash,
}

impl ClaimEvent {
    pub fn decode_submission(log: &Log) -> Result<Self, L1Error> {
        let event: IConsensus::ClaimSubmission = decode_log(log)?;
        Self::from_fields(log, event.app, event.claimHash, event.lastBlock)
    }

    pub fn decode_acceptance(log: &Log) -> Result<Self, L1Error> {
        let event: IConsensus::ClaimAcceptance = decode_log(log)?;
        Self::from_fields(log, event.app, event.claimHash, event.lastBlock)
    }

    fn from_fields(
        log: &Log,
        app: alloy_primitives::Address,
        claim_hash: B256,
        last_block: U256,
    ) -> Result<Self, L1Error> {
        Ok(Self {
            app: from_sol_address(app),
            claim_hash: claim_hash.0,
            last_block: to_u64(last_block, "last block")?,
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        })
    }

    /// The `ClaimSubmission` log a consensus contract emits for this claim.
    pub fn to_submission_log(&self, consensus: Address) -> Log {
        let event = IConsensus::ClaimSubmission {
            app: self.app.into(),
            claimHash: self.claim_hash.into(),
            lastBlock: U256::from(self.last_block),
        };
        encode_log(
            &event,
            consensus,
            self.block_number,
            self.log_index,
            self.transaction_hash,
        )
    }

    /// The `ClaimAcceptance` log a consensus contract emits for this claim.
    pub fn to_acceptance_log(&self, consensus: Address) -> Log {
        let event = IConsensus::ClaimAcceptance {
            app: self.app.into(),
            claimHash: self.claim_hash.into(),
            lastBlock: U256::from(self.last_block),
        };
        encode_log(
            &event,
            consensus,
            self.block_number,
            self.log_index,
            self.transaction_hash,
        )
    }
}

#[derive(Clone)]
pub struct ConsensusContract {
    address: Address,
    client: Arc<dyn EthClient>,
    retry: RetryPolicy,
}

impl ConsensusContract {
    pub fn new(address: Address, client: Arc<dyn EthClient>, retry: RetryPolicy) -> Self {
        Self {
            address,
            client,
            retry,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Calldata for `submitClaim(app, last_block, claim_hash)`.
    pub fn submit_claim_calldata(app: Address, last_block: u64, claim_hash: Hash) -> Vec<u8> {
        IConsensus::submitClaimCall {
            app: app.into(),
            lastBlock: U256::from(last_block),
            claimHash: claim_hash.into(),
        }
        .abi_encode()
    }

    async fn claim_events<E: SolEvent>(
        &self,
        app: Address,
        from: u64,
        to: u64,
        max_fetch_size: u64,
        decode: fn(&Log) -> Result<ClaimEvent, L1Error>,
    ) -> Result<Vec<ClaimEvent>, L1Error> {
        scan_logs(
            self.client.as_ref(),
            self.retry,
            self.address,
            app_topics::<E>(app),
            from,
            to,
            max_fetch_size,
        )
        .await?
        .iter()
        .map(decode)
        .collect()
    }

    /// `ClaimSubmission` events for `app` in `[from, to]`.
    pub async fn claim_submissions(
        &self,
        app: Address,
        from: u64,
        to: u64,
        max_fetch_size: u64,
    ) -> Result<Vec<ClaimEvent>, L1Error> {
        self.claim_events::<IConsensus::ClaimSubmission>(
            app,
            from,
            to,
            max_fetch_size,
            ClaimEvent::decode_submission,
        )
        .await
    }

    /// `ClaimAcceptance` events for `app` in `[from, to]`.
    pub async fn claim_acceptances(
        &self,
        app: Address,
        from: u64,
        to: u64,
        max_fetch_size: u64,
    ) -> Result<Vec<ClaimEvent>, L1Error> {
        self.claim_events::<IConsensus::ClaimAcceptance>(
            app,
            from,
            to,
            max_fetch_size,
            ClaimEvent::decode_acceptance,
        )
        .await
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

/// A decoded `OutputExecuted` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputExecuted {
    pub output_index: u64,
    pub output: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: Hash,
}

impl OutputExecuted {
    pub fn decode(log: &Log) -> Result<Self, L1Error> {
        let event: IApplication::OutputExecuted = decode_log(log)?;
        Ok(Self {
            output_index: event.outputIndex,
            output: event.output.to_vec(),
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
        })
    }

    pub fn to_log(&self, application: Address, log_index: u64) -> Log {
        let event = IApplication::OutputExecuted {
            outputIndex: self.output_index,
            output: self.output.clone().into(),
        };
        encode_log(
            &event,
            application,
            self.block_number,
            log_index,
            self.transaction_hash,
        )
    }
}

#[derive(Clone)]
pub struct ApplicationContract {
    address: Address,
    client: Arc<dyn EthClient>,
    retry: RetryPolicy,
}

impl ApplicationContract {
    pub fn new(address: Address, client: Arc<dyn EthClient>, retry: RetryPolicy) -> Self {
        Self {
            address,
            client,
            retry,
        }
    }

    /// `getTemplateHash()` at the latest block.
    pub async fn template_hash(&self) -> Result<Hash, L1Error> {
        let request = CallRequest::new(
            self.address,
            IApplication::getTemplateHashCall {}.abi_encode(),
        );
        let out = self
            .retry
            .run("getTemplateHash", || {
                self.client.call(&request, BlockTag::Latest)
            })
            .await?;
        Ok(IApplication::getTemplateHashCall::abi_decode_returns(&out, true)?._0.0)
    }

    /// `OutputExecuted` events in `[from, to]`.
    pub async fn output_executions(
        &self,
        from: u64,
        to: u64,
        max_fetch_size: u64,
    ) -> Result<Vec<OutputExecuted>, L1Error> {
        let topics = vec![Some(IApplication::OutputExecuted::SIGNATURE_HASH.0)];
        scan_logs(
            self.client.as_ref(),
            self.retry,
            self.address,
            topics,
            from,
            to,
            max_fetch_size,
        )
        .await?
        .iter()
        .map(OutputExecuted::decode)
        .collect()
    }
}
