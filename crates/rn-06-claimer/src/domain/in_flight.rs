//! # In-Flight Claims
//!
//! Claims that may already be on their way to L1. An entry blocks
//! resubmission until either the matching `ClaimSubmission` event shows up
//! or the entry ages out.
//!
//! Entries are keyed by `(app, last_block, claim_hash)` rather than the claim
//! hash alone: an empty epoch repeats its predecessor's claim.

use std::collections::HashMap;

use shared_types::{Address, ComputedClaim, Hash};

/// Blocks after which an unconfirmed submission may be sent again.
pub const RESUBMIT_AFTER_BLOCKS: u64 = 7;

/// What `submitClaim` commits to on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimKey {
    pub app: Address,
    pub last_block: u64,
    pub claim_hash: Hash,
}

impl ClaimKey {
    pub fn of(claim: &ComputedClaim) -> Self {
        Self {
            app: claim.app_address,
            last_block: claim.last_block,
            claim_hash: claim.claim_hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub submitted_at: u64,
    /// Our transaction, or `None` for entries restored at startup.
    pub transaction_hash: Option<Hash>,
}

#[derive(Debug, Default)]
pub struct InFlightClaims {
    entries: HashMap<ClaimKey, InFlight>,
}

impl InFlightClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, key: ClaimKey, submitted_at: u64, transaction_hash: Option<Hash>) {
        self.entries.insert(
            key,
            InFlight {
                submitted_at,
                transaction_hash,
            },
        );
    }

    pub fn contains(&self, key: &ClaimKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn take(&mut self, key: &ClaimKey) -> Option<InFlight> {
        self.entries.remove(key)
    }

    /// Whether `transaction_hash` is the one we sent for `key`.
    pub fn is_ours(&self, key: &ClaimKey, transaction_hash: &Hash) -> bool {
        self.entries
            .get(key)
            .and_then(|entry| entry.transaction_hash)
            .is_some_and(|ours| &ours == transaction_hash)
    }

    /// Drop entries older than [`RESUBMIT_AFTER_BLOCKS`] at `current_block`.
    /// Returns how many were dropped.
    pub fn expire(&mut self, current_block: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| current_block <= entry.submitted_at + RESUBMIT_AFTER_BLOCKS);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
