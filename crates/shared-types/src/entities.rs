//! # Core Domain Entities
//!
//! The persistent rollup entities, as seen by every worker.
//!
//! ## Clusters
//!
//! - **Applications**: `Application`, `ApplicationStatus`
//! - **Epochs & Claims**: `Epoch`, `EpochStatus`, `ComputedClaim`
//! - **Inputs & Results**: `Input`, `InputCompletionStatus`, `AdvanceResult`
//! - **Side Effects**: `Output`, `Report`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use primitive_types::U256;

use crate::errors::{HexError, UnknownStatus};

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// The all-zero hash.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Render bytes as `0x`-prefixed lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode `0x`-prefixed (or bare) hex into a byte vector.
pub fn decode_hex(value: &str) -> Result<Vec<u8>, HexError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| HexError::Invalid(e.to_string()))
}

fn decode_fixed<const N: usize>(value: &str) -> Result<[u8; N], HexError> {
    let bytes = decode_hex(value)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| HexError::Length {
        expected: N,
        actual,
    })
}

/// Parse a 32-byte hash from hex.
pub fn parse_hash(value: &str) -> Result<Hash, HexError> {
    decode_fixed::<32>(value)
}

/// Parse a 20-byte address from hex.
pub fn parse_address(value: &str) -> Result<Address, HexError> {
    decode_fixed::<20>(value)
}

/// Implements `as_str`, `Display` and `FromStr` for a status enum from one
/// table of `Variant => "stored_name"` pairs.
macro_rules! string_status {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// The name under which this status is stored.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// =============================================================================
// APPLICATIONS
// =============================================================================

/// Whether the node should drive an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Running,
    NotRunning,
}

string_status!(ApplicationStatus, "application", {
    Running => "running",
    NotRunning => "not_running",
});

/// A rollup instance, identified by its on-chain contract address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Surrogate id.
    pub id: u64,
    pub contract_address: Address,
    /// Hash of the VM template the application was deployed with.
    pub template_hash: Hash,
    /// The consensus contract claims are submitted to.
    pub iconsensus_address: Address,
    /// Last L1 block the reader fully scanned for inputs.
    pub last_processed_block: u64,
    /// Last L1 block scanned for claim acceptances.
    pub last_claim_check_block: u64,
    /// Last L1 block scanned for output executions.
    pub last_output_check_block: u64,
    pub status: ApplicationStatus,
}

impl Application {
    /// A running application with all cursors at zero.
    pub fn new(contract_address: Address, template_hash: Hash, iconsensus_address: Address) -> Self {
        Self {
            id: 0,
            contract_address,
            template_hash,
            iconsensus_address,
            last_processed_block: 0,
            last_claim_check_block: 0,
            last_output_check_block: 0,
            status: ApplicationStatus::Running,
        }
    }
}

// =============================================================================
// EPOCHS & CLAIMS
// =============================================================================

/// Epoch lifecycle.
///
/// Variants are declared in lifecycle order, so `Ord` answers
/// "has this epoch reached at least X".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochStatus {
    Open,
    Closed,
    ProcessedAllInputs,
    ClaimComputed,
    ClaimSubmitted,
    ClaimAccepted,
}

string_status!(EpochStatus, "epoch", {
    Open => "open",
    Closed => "closed",
    ProcessedAllInputs => "processed_all_inputs",
    ClaimComputed => "claim_computed",
    ClaimSubmitted => "claim_submitted",
    ClaimAccepted => "claim_accepted",
});

impl EpochStatus {
    /// The only status this one may move to, if any.
    pub fn next(&self) -> Option<EpochStatus> {
        match self {
            Self::Open => Some(Self::Closed),
            Self::Closed => Some(Self::ProcessedAllInputs),
            Self::ProcessedAllInputs => Some(Self::ClaimComputed),
            Self::ClaimComputed => Some(Self::ClaimSubmitted),
            Self::ClaimSubmitted => Some(Self::ClaimAccepted),
            Self::ClaimAccepted => None,
        }
    }
}

/// A contiguous window of L1 blocks grouping inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    /// Surrogate id, assigned by the repository.
    pub id: u64,
    pub application_address: Address,
    pub index: u64,
    pub first_block: u64,
    /// Inclusive.
    pub last_block: u64,
    pub claim_hash: Option<Hash>,
    /// Transaction that submitted or accepted the claim.
    pub transaction_hash: Option<Hash>,
    pub status: EpochStatus,
}

impl Epoch {
    /// Epoch `index` of an application whose epochs start at `origin_block`.
    pub fn at_index(
        application_address: Address,
        index: u64,
        epoch_length: u64,
        origin_block: u64,
    ) -> Self {
        let first_block = index * epoch_length + origin_block;
        Self {
            id: 0,
            application_address,
            index,
            first_block,
            last_block: first_block + epoch_length - 1,
            claim_hash: None,
            transaction_hash: None,
            status: EpochStatus::Open,
        }
    }

    /// Whether `block` falls inside `[first_block, last_block]`.
    pub fn contains_block(&self, block: u64) -> bool {
        self.first_block <= block && block <= self.last_block
    }
}

/// A claim ready to be submitted to the consensus contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedClaim {
    pub epoch_id: u64,
    pub app_address: Address,
    pub iconsensus_address: Address,
    pub epoch_index: u64,
    pub first_block: u64,
    pub last_block: u64,
    pub claim_hash: Hash,
}

// =============================================================================
// INPUTS & RESULTS
// =============================================================================

/// How the VM finished processing an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputCompletionStatus {
    /// Not processed yet.
    None,
    Accepted,
    Rejected,
    Exception,
    CycleLimitExceeded,
    TimeLimitExceeded,
    PayloadLengthLimitExceeded,
}

string_status!(InputCompletionStatus, "input", {
    None => "none",
    Accepted => "accepted",
    Rejected => "rejected",
    Exception => "exception",
    CycleLimitExceeded => "cycle_limit_exceeded",
    TimeLimitExceeded => "time_limit_exceeded",
    PayloadLengthLimitExceeded => "payload_length_limit_exceeded",
});

/// A user-authored input, as emitted by the InputBox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Surrogate id, assigned by the repository.
    pub id: u64,
    pub application_address: Address,
    pub index: u64,
    /// Surrogate id of the containing epoch, assigned by the repository.
    pub epoch_id: u64,
    pub block_number: u64,
    pub raw_data: Vec<u8>,
    pub status: InputCompletionStatus,
    pub outputs_hash: Option<Hash>,
    pub machine_hash: Option<Hash>,
    /// L1 transaction that emitted the input.
    pub transaction_reference: Hash,
}

impl Input {
    /// A freshly read, unprocessed input.
    pub fn unprocessed(
        application_address: Address,
        index: u64,
        block_number: u64,
        raw_data: Vec<u8>,
        transaction_reference: Hash,
    ) -> Self {
        Self {
            id: 0,
            application_address,
            index,
            epoch_id: 0,
            block_number,
            raw_data,
            status: InputCompletionStatus::None,
            outputs_hash: None,
            machine_hash: None,
            transaction_reference,
        }
    }
}

/// One epoch together with the new inputs that fall inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochInputs {
    pub epoch: Epoch,
    pub inputs: Vec<Input>,
}

/// Everything one VM advance step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceResult {
    pub status: InputCompletionStatus,
    pub outputs: Vec<Vec<u8>>,
    pub reports: Vec<Vec<u8>>,
    pub outputs_hash: Hash,
    pub machine_hash: Option<Hash>,
}

// =============================================================================
// SIDE EFFECTS
// =============================================================================

/// A verifiable side effect produced by the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: u64,
    pub input_id: u64,
    /// Application-wide index.
    pub index: u64,
    pub raw_data: Vec<u8>,
    /// Keccak-256 of `raw_data`, set once proofs are computed.
    pub hash: Option<Hash>,
    /// Merkle path from this leaf to the claimed root.
    pub output_hashes_siblings: Vec<Hash>,
    /// L1 transaction that executed the output.
    pub transaction_hash: Option<Hash>,
}

/// A diagnostic, non-verifiable side effect produced by the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: u64,
    pub input_id: u64,
    /// Index within the producing input.
    pub index: u64,
    pub raw_data: Vec<u8>,
}
