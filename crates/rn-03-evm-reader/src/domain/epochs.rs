//! # Epoch Partitioning
//!
//! Epoch `k` of an application covers blocks
//! `[k * length + origin, (k + 1) * length + origin - 1]`, where `origin` is
//! the InputBox deployment block. Boundaries never depend on what was read,
//! so a restarted reader rebuilds exactly the same epochs.

use std::collections::BTreeMap;

use shared_l1::InputAdded;
use shared_types::{Address, Epoch, EpochInputs, EpochStatus, Input};

use super::errors::ReaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochLayout {
    pub length: u64,
    pub origin_block: u64,
}

impl EpochLayout {
    pub fn new(length: u64, origin_block: u64) -> Self {
        Self {
            length: length.max(1),
            origin_block,
        }
    }

    /// Index of the epoch containing `block`. Blocks before the origin map
    /// to epoch 0.
    pub fn index_of(&self, block: u64) -> u64 {
        block.saturating_sub(self.origin_block) / self.length
    }

    pub fn epoch(&self, app: Address, index: u64) -> Epoch {
        Epoch::at_index(app, index, self.length, self.origin_block)
    }
}

/// One batch entry per epoch from `first_index` through the epoch holding
/// `finalized`, each carrying the events that fall inside it.
///
/// Epochs ending strictly before `finalized` are marked closed; the rest
/// stay open. `events` must already be in `(block, log_index)` order.
pub fn partition_inputs(
    app: Address,
    layout: EpochLayout,
    first_index: u64,
    finalized: u64,
    events: Vec<InputAdded>,
) -> Result<Vec<EpochInputs>, ReaderError> {
    let status_of = |epoch: &Epoch| {
        if epoch.last_block < finalized {
            EpochStatus::Closed
        } else {
            EpochStatus::Open
        }
    };
    let entry_for = |index: u64| {
        let epoch = layout.epoch(app, index);
        EpochInputs {
            epoch: Epoch {
                status: status_of(&epoch),
                ..epoch
            },
            inputs: Vec::new(),
        }
    };

    let mut entries: BTreeMap<u64, EpochInputs> = (first_index..=layout.index_of(finalized))
        .map(|index| (index, entry_for(index)))
        .collect();

    for event in events {
        if event.app != app {
            return Err(ReaderError::ForeignInput {
                expected: app,
                found: event.app,
            });
        }
        let index = layout.index_of(event.block_number);
        entries
            .entry(index)
            .or_insert_with(|| entry_for(index))
            .inputs
            .push(Input::unprocessed(
                app,
                event.index,
                event.block_number,
                event.input,
                event.transaction_hash,
            ));
    }

    Ok(entries.into_values().collect())
}
