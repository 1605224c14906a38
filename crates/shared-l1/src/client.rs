//! # EthClient Port
//!
//! The subset of the Ethereum JSON-RPC API the rollup workers use.
//! Adapters: [`crate::HttpEthClient`] (production), [`crate::MockEthClient`]
//! (tests).

use async_trait::async_trait;
use primitive_types::U256;
use shared_types::{Address, Hash};

use crate::errors::L1Error;
use crate::types::{BlockHeader, BlockTag, CallRequest, Log, LogFilter};

#[async_trait]
pub trait EthClient: Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> Result<u64, L1Error>;

    /// `eth_blockNumber`
    async fn block_number(&self) -> Result<u64, L1Error>;

    /// `eth_getBlockByNumber(tag, false)`
    async fn header_by_tag(&self, tag: BlockTag) -> Result<BlockHeader, L1Error>;

    /// `eth_getLogs`, ordered by `(block_number, log_index)`.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, L1Error>;

    /// `eth_call`
    async fn call(&self, request: &CallRequest, block: BlockTag) -> Result<Vec<u8>, L1Error>;

    /// `eth_getTransactionCount`
    async fn transaction_count(&self, address: Address, block: BlockTag) -> Result<u64, L1Error>;

    /// `eth_gasPrice`
    async fn gas_price(&self) -> Result<U256, L1Error>;

    /// `eth_maxPriorityFeePerGas`
    async fn max_priority_fee_per_gas(&self) -> Result<U256, L1Error>;

    /// `eth_estimateGas`. Reverting calls fail here.
    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, L1Error>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash, L1Error>;
}
