//! # Shared L1
//!
//! Everything the rollup workers need to talk to the L1 chain.
//!
//! ## Crate Structure
//!
//! - `client` - the [`EthClient`] port every worker depends on
//! - `http` - JSON-RPC adapter over `reqwest`
//! - `ws` - `newHeads` subscription used as a wake-up signal
//! - `contracts` - `sol!` bindings for InputBox, IConsensus and Application
//! - `retry` - the retry policy wrapping every L1 call
//! - `mock` - in-memory chain for tests
//!
//! ## Contract Surface
//!
//! | Contract | Item | Use |
//! |----------|------|-----|
//! | InputBox | `InputAdded(address indexed,uint256 indexed,address,bytes)` | input ingestion |
//! | InputBox | `getNumberOfInputs(address)`, `getInputHash(address,uint256)` | verification |
//! | Application | `getTemplateHash()` | startup check |
//! | Application | `OutputExecuted(uint64,bytes)` | execution watcher |
//! | IConsensus | `submitClaim(address,uint256,bytes32)` | claim submission |
//! | IConsensus | `ClaimSubmission(address indexed,bytes32,uint256)` | claim reconciliation |
//! | IConsensus | `ClaimAcceptance(address indexed,bytes32,uint256)` | acceptance watcher |

pub mod client;
pub mod contracts;
pub mod errors;
pub mod http;
pub mod mock;
pub mod retry;
pub mod types;
pub mod ws;

pub use client::EthClient;
pub use contracts::{
    ApplicationContract, ClaimEvent, ConsensusContract, IApplication, IConsensus, IInputBox,
    InputAdded, InputBox, OutputExecuted,
};
pub use errors::L1Error;
pub use http::HttpEthClient;
pub use mock::MockEthClient;
pub use retry::{retry, RetryPolicy};
pub use types::{BlockHeader, BlockTag, CallRequest, Log, LogFilter};
pub use ws::HeaderSubscriber;
