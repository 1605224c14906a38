//! # Mock L1 Chain
//!
//! An in-memory [`EthClient`] for tests: scripted heads, a log store, canned
//! `eth_call` responses, and a record of every broadcast transaction.

use std::collections::HashMap;

use alloy_sol_types::SolCall;
use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::U256;
use shared_crypto::keccak256;
use shared_types::{Address, Hash};

use crate::client::EthClient;
use crate::contracts::{IApplication, IInputBox};
use crate::errors::L1Error;
use crate::types::{BlockHeader, BlockTag, CallRequest, Log, LogFilter};

#[derive(Default)]
struct MockChain {
    chain_id: u64,
    latest: u64,
    finalized: u64,
    logs: Vec<Log>,
    call_responses: HashMap<(Address, [u8; 4]), Vec<u8>>,
    sent: Vec<Vec<u8>>,
    /// Sent transactions evicted before being mined.
    dropped: usize,
    fail_next: u64,
    revert_estimates: bool,
    log_queries: Vec<(u64, u64)>,
}

/// Mock L1 node for testing.
pub struct MockEthClient {
    chain: Mutex<MockChain>,
}

impl Default for MockEthClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEthClient {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(MockChain {
                chain_id: 31337,
                ..MockChain::default()
            }),
        }
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.chain.lock().chain_id = chain_id;
        self
    }

    /// Move the finalized head (and the latest head, if behind it).
    pub fn set_finalized(&self, block: u64) {
        let mut chain = self.chain.lock();
        chain.finalized = block;
        chain.latest = chain.latest.max(block);
    }

    pub fn set_latest(&self, block: u64) {
        self.chain.lock().latest = block;
    }

    pub fn push_log(&self, log: Log) {
        self.chain.lock().logs.push(log);
    }

    /// Answer `eth_call`s to `to` whose calldata starts with `selector`.
    pub fn set_call_response(&self, to: Address, selector: [u8; 4], response: Vec<u8>) {
        self.chain
            .lock()
            .call_responses
            .insert((to, selector), response);
    }

    /// Answer `getNumberOfInputs(..)` on `input_box` with `count`.
    pub fn set_number_of_inputs(&self, input_box: Address, count: u64) {
        self.set_call_response(
            input_box,
            IInputBox::getNumberOfInputsCall::SELECTOR,
            alloy_primitives::U256::from(count).to_be_bytes::<32>().to_vec(),
        );
    }

    /// Answer `getTemplateHash()` on `application` with `hash`.
    pub fn set_template_hash(&self, application: Address, hash: Hash) {
        self.set_call_response(
            application,
            IApplication::getTemplateHashCall::SELECTOR,
            hash.to_vec(),
        );
    }

    /// Fail the next `count` requests of any kind with a transport error.
    pub fn fail_next_calls(&self, count: u64) {
        self.chain.lock().fail_next = count;
    }

    /// Make `eth_estimateGas` report a revert.
    pub fn set_revert_estimates(&self, revert: bool) {
        self.chain.lock().revert_estimates = revert;
    }

    /// Raw transactions broadcast so far.
    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.chain.lock().sent.clone()
    }

    /// Evict every transaction sent so far, as a mempool does with
    /// underpriced ones. They stay in `sent_transactions` but no longer
    /// count towards the sender's nonce.
    pub fn drop_pending_transactions(&self) {
        let mut chain = self.chain.lock();
        chain.dropped = chain.sent.len();
    }

    /// `(from_block, to_block)` of every `eth_getLogs` request so far.
    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.chain.lock().log_queries.clone()
    }

    fn check_failure(&self) -> Result<(), L1Error> {
        let mut chain = self.chain.lock();
        if chain.fail_next > 0 {
            chain.fail_next -= 1;
            return Err(L1Error::Transport("mock node unreachable".into()));
        }
        Ok(())
    }

    fn header_at(number: u64) -> BlockHeader {
        BlockHeader {
            number,
            hash: keccak256(&number.to_be_bytes()),
            parent_hash: keccak256(&number.saturating_sub(1).to_be_bytes()),
            timestamp: 1_700_000_000 + number * 12,
            base_fee_per_gas: Some(U256::from(1_000_000_000u64)),
        }
    }
}

#[async_trait]
impl EthClient for MockEthClient {
    async fn chain_id(&self) -> Result<u64, L1Error> {
        self.check_failure()?;
        Ok(self.chain.lock().chain_id)
    }

    async fn block_number(&self) -> Result<u64, L1Error> {
        self.check_failure()?;
        Ok(self.chain.lock().latest)
    }

    async fn header_by_tag(&self, tag: BlockTag) -> Result<BlockHeader, L1Error> {
        self.check_failure()?;
        let chain = self.chain.lock();
        let number = match tag {
            BlockTag::Latest | BlockTag::Pending => chain.latest,
            BlockTag::Safe | BlockTag::Finalized => chain.finalized,
            BlockTag::Number(n) if n <= chain.latest => n,
            BlockTag::Number(n) => return Err(L1Error::BlockNotFound(n.to_string())),
        };
        Ok(Self::header_at(number))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, L1Error> {
        self.check_failure()?;
        let mut chain = self.chain.lock();
        chain.log_queries.push((filter.from_block, filter.to_block));
        let mut logs: Vec<Log> = chain
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn call(&self, request: &CallRequest, _block: BlockTag) -> Result<Vec<u8>, L1Error> {
        self.check_failure()?;
        let selector: [u8; 4] = request
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| L1Error::Decode("calldata shorter than a selector".into()))?;
        self.chain
            .lock()
            .call_responses
            .get(&(request.to, selector))
            .cloned()
            .ok_or_else(|| L1Error::Rpc {
                code: 3,
                message: "execution reverted".into(),
            })
    }

    async fn transaction_count(&self, _address: Address, _block: BlockTag) -> Result<u64, L1Error> {
        self.check_failure()?;
        let chain = self.chain.lock();
        Ok((chain.sent.len() - chain.dropped) as u64)
    }

    async fn gas_price(&self) -> Result<U256, L1Error> {
        self.check_failure()?;
        Ok(U256::from(2_000_000_000u64))
    }

    async fn max_priority_fee_per_gas(&self) -> Result<U256, L1Error> {
        self.check_failure()?;
        Ok(U256::from(1_000_000_000u64))
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> Result<u64, L1Error> {
        self.check_failure()?;
        if self.chain.lock().revert_estimates {
            return Err(L1Error::Rpc {
                code: 3,
                message: "execution reverted".into(),
            });
        }
        Ok(100_000)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash, L1Error> {
        self.check_failure()?;
        self.chain.lock().sent.push(raw.to_vec());
        Ok(keccak256(raw))
    }
}
