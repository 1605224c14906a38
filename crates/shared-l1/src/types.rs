//! Chain data as the workers see it, already decoded from JSON-RPC hex.

use primitive_types::U256;
use shared_types::{Address, Hash};

/// Block selector for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    /// Latest plus the node's mempool; used for nonces.
    Pending,
    Safe,
    Finalized,
    Number(u64),
}

impl BlockTag {
    /// JSON-RPC parameter form.
    pub fn to_param(&self) -> String {
        match self {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Pending => "pending".to_string(),
            BlockTag::Safe => "safe".to_string(),
            BlockTag::Finalized => "finalized".to_string(),
            BlockTag::Number(n) => format!("0x{n:x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub timestamp: u64,
    /// Present on post-London chains.
    pub base_fee_per_gas: Option<U256>,
}

/// An emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Hash,
}

/// `eth_getLogs` filter over an inclusive block range.
///
/// `topics[i] == None` matches anything in position `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<Option<Hash>>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    /// Whether `log` passes this filter.
    pub fn matches(&self, log: &Log) -> bool {
        log.address == self.address
            && (self.from_block..=self.to_block).contains(&log.block_number)
            && self
                .topics
                .iter()
                .enumerate()
                .all(|(i, topic)| match topic {
                    Some(t) => log.topics.get(i) == Some(t),
                    None => true,
                })
    }
}

/// Read-only call or gas estimation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Vec<u8>,
}

impl CallRequest {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        Self {
            from: None,
            to,
            data,
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }
}
