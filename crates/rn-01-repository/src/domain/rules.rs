//! # Write Rules
//!
//! Pure checks shared by every adapter. An adapter loads the slice of state
//! a write touches, asks these functions what to do, and applies the answer
//! inside one transaction. Nothing is written when a check fails.

use std::collections::BTreeMap;

use shared_types::{
    AdvanceResult, Address, Epoch, EpochInputs, EpochStatus, Input, InputCompletionStatus,
};

use super::errors::RepositoryError;

/// What a validated `store_epochs_and_inputs` batch will change.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// Epochs not stored yet, in index order.
    pub new_epochs: Vec<Epoch>,
    /// Indices of stored open epochs the batch closes.
    pub closed_epochs: Vec<u64>,
    /// `(epoch index, input)` pairs, in input index order.
    pub inputs: Vec<(u64, Input)>,
}

/// Validate a reader batch against the stored epochs it touches.
///
/// `stored` must hold every stored epoch whose index appears in `batch`.
/// `last_epoch_index` is the highest stored epoch index and `input_count`
/// the number of stored inputs of the application.
pub fn plan_epochs_and_inputs(
    app: Address,
    stored: &BTreeMap<u64, Epoch>,
    last_epoch_index: Option<u64>,
    input_count: u64,
    mut batch: Vec<EpochInputs>,
) -> Result<BatchPlan, RepositoryError> {
    batch.sort_by_key(|entry| entry.epoch.index);

    let mut plan = BatchPlan::default();
    let mut next_epoch_index = last_epoch_index.map_or(0, |index| index + 1);
    let mut next_input_index = input_count;

    for EpochInputs { epoch, mut inputs } in batch {
        match stored.get(&epoch.index) {
            Some(existing) => {
                if existing.first_block != epoch.first_block
                    || existing.last_block != epoch.last_block
                {
                    return Err(RepositoryError::DuplicateEpoch {
                        app,
                        index: epoch.index,
                    });
                }
                if existing.status == EpochStatus::Open && epoch.status == EpochStatus::Closed {
                    plan.closed_epochs.push(epoch.index);
                }
            }
            None => {
                if epoch.index != next_epoch_index {
                    return Err(RepositoryError::EpochIndexGap {
                        app,
                        expected: next_epoch_index,
                        found: epoch.index,
                    });
                }
                next_epoch_index += 1;
                plan.new_epochs.push(Epoch {
                    application_address: app,
                    claim_hash: None,
                    transaction_hash: None,
                    ..epoch.clone()
                });
            }
        }

        inputs.sort_by_key(|input| input.index);
        for input in inputs {
            if input.index < next_input_index {
                return Err(RepositoryError::DuplicateInput {
                    app,
                    index: input.index,
                });
            }
            if input.index > next_input_index {
                return Err(RepositoryError::InputIndexGap {
                    app,
                    expected: next_input_index,
                    found: input.index,
                });
            }
            if !epoch.contains_block(input.block_number) {
                return Err(RepositoryError::InputOutsideEpoch {
                    index: input.index,
                    block: input.block_number,
                    first_block: epoch.first_block,
                    last_block: epoch.last_block,
                });
            }
            next_input_index += 1;
            plan.inputs.push((
                epoch.index,
                Input {
                    application_address: app,
                    status: InputCompletionStatus::None,
                    outputs_hash: None,
                    machine_hash: None,
                    ..input
                },
            ));
        }
    }

    Ok(plan)
}

/// The reader cursor only moves forward.
pub fn check_processed_block(
    app: Address,
    current: u64,
    requested: u64,
) -> Result<(), RepositoryError> {
    if requested < current {
        return Err(RepositoryError::ProcessedBlockRegression {
            app,
            current,
            requested,
        });
    }
    Ok(())
}

/// An advance result may only land on an unprocessed input, and only an
/// accepted input may carry outputs.
pub fn check_advance_result(
    input_id: u64,
    stored_status: InputCompletionStatus,
    result: &AdvanceResult,
) -> Result<(), RepositoryError> {
    if stored_status != InputCompletionStatus::None {
        return Err(RepositoryError::InputAlreadyProcessed {
            input_id,
            status: stored_status,
        });
    }
    if result.status != InputCompletionStatus::Accepted && !result.outputs.is_empty() {
        return Err(RepositoryError::OutputsOnUnacceptedInput {
            input_id,
            status: result.status,
        });
    }
    Ok(())
}

/// Epoch statuses only move one step forward.
pub fn check_transition(
    epoch_id: u64,
    from: EpochStatus,
    to: EpochStatus,
) -> Result<(), RepositoryError> {
    if from.next() != Some(to) {
        return Err(RepositoryError::InvalidTransition { epoch_id, from, to });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: Address = [0xaa; 20];

    fn epoch(index: u64, status: EpochStatus) -> Epoch {
        Epoch {
            status,
            ..Epoch::at_index(APP, index, 10, 100)
        }
    }

    fn input(index: u64, block: u64) -> Input {
        Input::unprocessed(APP, index, block, vec![index as u8], [1; 32])
    }

    #[test]
    fn test_fresh_batch_creates_epochs_and_inputs() {
        let batch = vec![
            EpochInputs {
                epoch: epoch(0, EpochStatus::Closed),
                inputs: vec![input(0, 101), input(1, 109)],
            },
            EpochInputs {
                epoch: epoch(1, EpochStatus::Open),
                inputs: vec![input(2, 110)],
            },
        ];

        let plan = plan_epochs_and_inputs(APP, &BTreeMap::new(), None, 0, batch).unwrap();
        assert_eq!(plan.new_epochs.len(), 2);
        assert!(plan.closed_epochs.is_empty());
        let indices: Vec<_> = plan.inputs.iter().map(|(e, i)| (*e, i.index)).collect();
        assert_eq!(indices, vec![(0, 0), (0, 1), (1, 2)]);
    }

    #[test]
    fn test_stored_open_epoch_is_closed() {
        let stored = BTreeMap::from([(0, epoch(0, EpochStatus::Open))]);
        let batch = vec![EpochInputs {
            epoch: epoch(0, EpochStatus::Closed),
            inputs: vec![],
        }];

        let plan = plan_epochs_and_inputs(APP, &stored, Some(0), 3, batch).unwrap();
        assert!(plan.new_epochs.is_empty());
        assert_eq!(plan.closed_epochs, vec![0]);
    }

    #[test]
    fn test_stored_epoch_never_regresses() {
        let stored = BTreeMap::from([(0, epoch(0, EpochStatus::ClaimComputed))]);
        let batch = vec![EpochInputs {
            epoch: epoch(0, EpochStatus::Closed),
            inputs: vec![],
        }];

        let plan = plan_epochs_and_inputs(APP, &stored, Some(0), 0, batch).unwrap();
        assert_eq!(plan, BatchPlan::default());
    }

    #[test]
    fn test_conflicting_epoch_range_is_duplicate() {
        let stored = BTreeMap::from([(0, epoch(0, EpochStatus::Open))]);
        let mut conflicting = epoch(0, EpochStatus::Open);
        conflicting.last_block += 1;
        let batch = vec![EpochInputs {
            epoch: conflicting,
            inputs: vec![],
        }];

        let err = plan_epochs_and_inputs(APP, &stored, Some(0), 0, batch).unwrap_err();
        assert_eq!(err, RepositoryError::DuplicateEpoch { app: APP, index: 0 });
    }

    #[test]
    fn test_epoch_gap_is_rejected() {
        let batch = vec![EpochInputs {
            epoch: epoch(2, EpochStatus::Open),
            inputs: vec![],
        }];
        let err = plan_epochs_and_inputs(APP, &BTreeMap::new(), Some(0), 0, batch).unwrap_err();
        assert_eq!(err.error_kind(), "epoch_index_gap");
    }

    #[test]
    fn test_duplicate_input_index_is_rejected() {
        let batch = vec![EpochInputs {
            epoch: epoch(0, EpochStatus::Open),
            inputs: vec![input(0, 101)],
        }];
        let err = plan_epochs_and_inputs(APP, &BTreeMap::new(), None, 1, batch).unwrap_err();
        assert_eq!(err, RepositoryError::DuplicateInput { app: APP, index: 0 });
    }

    #[test]
    fn test_input_gap_is_rejected() {
        let batch = vec![EpochInputs {
            epoch: epoch(0, EpochStatus::Open),
            inputs: vec![input(1, 101)],
        }];
        let err = plan_epochs_and_inputs(APP, &BTreeMap::new(), None, 0, batch).unwrap_err();
        assert_eq!(
            err,
            RepositoryError::InputIndexGap {
                app: APP,
                expected: 0,
                found: 1
            }
        );
    }

    #[test]
    fn test_input_outside_its_epoch_is_rejected() {
        let batch = vec![EpochInputs {
            epoch: epoch(0, EpochStatus::Open),
            inputs: vec![input(0, 110)],
        }];
        let err = plan_epochs_and_inputs(APP, &BTreeMap::new(), None, 0, batch).unwrap_err();
        assert_eq!(err.error_kind(), "input_outside_epoch");
    }

    #[test]
    fn test_outputs_require_accepted_status() {
        let mut result = AdvanceResult {
            status: InputCompletionStatus::Rejected,
            outputs: vec![vec![1]],
            reports: vec![],
            outputs_hash: [0; 32],
            machine_hash: None,
        };
        assert!(check_advance_result(7, InputCompletionStatus::None, &result).is_err());

        result.status = InputCompletionStatus::Accepted;
        assert!(check_advance_result(7, InputCompletionStatus::None, &result).is_ok());
        assert_eq!(
            check_advance_result(7, InputCompletionStatus::Accepted, &result).unwrap_err(),
            RepositoryError::InputAlreadyProcessed {
                input_id: 7,
                status: InputCompletionStatus::Accepted
            }
        );
    }

    #[test]
    fn test_transitions_move_one_step() {
        assert!(check_transition(1, EpochStatus::ClaimComputed, EpochStatus::ClaimSubmitted).is_ok());
        assert!(check_transition(1, EpochStatus::Closed, EpochStatus::ClaimComputed).is_err());
        assert!(check_transition(1, EpochStatus::ClaimSubmitted, EpochStatus::Closed).is_err());
    }

    #[test]
    fn test_processed_block_is_monotonic() {
        assert!(check_processed_block(APP, 10, 10).is_ok());
        assert!(check_processed_block(APP, 10, 9).is_err());
    }
}
