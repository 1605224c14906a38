//! # Inbound Ports (Driving Side)
//!
//! The persistence API every worker drives. Each method is one atomic
//! transaction: either all of its writes are visible or none are.

use std::collections::HashMap;

use async_trait::async_trait;
use shared_types::{
    AdvanceResult, Address, Application, ComputedClaim, Epoch, EpochInputs, Hash, Input, Output,
    Report,
};

use crate::domain::errors::RepositoryError;

/// Schema version this crate reads and writes.
pub const SCHEMA_VERSION: i64 = 1;

/// Persistence API for the rollup pipeline.
#[async_trait]
pub trait Repository: Send + Sync {
    // =========================================================================
    // SCHEMA
    // =========================================================================

    /// Fail unless the backing store carries [`SCHEMA_VERSION`].
    async fn check_schema_version(&self) -> Result<(), RepositoryError>;

    // =========================================================================
    // APPLICATIONS
    // =========================================================================

    /// Register an application. Returns its surrogate id.
    ///
    /// Applications are normally provisioned by external tooling; the node
    /// itself only reads them.
    async fn insert_application(&self, app: &Application) -> Result<u64, RepositoryError>;

    async fn get_application(
        &self,
        address: Address,
    ) -> Result<Option<Application>, RepositoryError>;

    /// Applications with status `running`, ordered by address.
    async fn get_all_running_applications(&self) -> Result<Vec<Application>, RepositoryError>;

    /// Last L1 block the reader fully scanned for this application.
    async fn get_last_processed_block(&self, app: Address) -> Result<u64, RepositoryError>;

    async fn update_last_claim_check_block(
        &self,
        app: Address,
        block: u64,
    ) -> Result<(), RepositoryError>;

    async fn update_last_output_check_block(
        &self,
        app: Address,
        block: u64,
    ) -> Result<(), RepositoryError>;

    // =========================================================================
    // READER WRITES
    // =========================================================================

    /// Insert new epochs and inputs and advance the reader cursor.
    ///
    /// Stored epochs in the batch are matched by index: an open epoch may be
    /// closed, nothing else about it changes. A stored input index, a gap in
    /// epoch or input indices, or an input outside its epoch rejects the
    /// whole batch.
    async fn store_epochs_and_inputs(
        &self,
        app: Address,
        epochs: Vec<EpochInputs>,
        last_processed_block: u64,
    ) -> Result<(), RepositoryError>;

    // =========================================================================
    // QUERIES
    // =========================================================================

    async fn get_epoch(&self, app: Address, index: u64) -> Result<Option<Epoch>, RepositoryError>;

    async fn get_input(&self, app: Address, index: u64) -> Result<Option<Input>, RepositoryError>;

    /// Number of inputs stored for the application.
    async fn get_input_count(&self, app: Address) -> Result<u64, RepositoryError>;

    async fn get_outputs_by_input(&self, input_id: u64) -> Result<Vec<Output>, RepositoryError>;

    async fn get_reports_by_input(&self, input_id: u64) -> Result<Vec<Report>, RepositoryError>;

    // =========================================================================
    // ADVANCER
    // =========================================================================

    /// Unprocessed inputs of non-open epochs, keyed by application and
    /// ordered by index. Applications without such inputs are omitted.
    async fn get_unprocessed_inputs(
        &self,
        apps: &[Address],
    ) -> Result<HashMap<Address, Vec<Input>>, RepositoryError>;

    /// Persist a VM result for `input`: its status and hashes, its outputs
    /// (indexed after the application's highest output index) and its
    /// reports (indexed from zero).
    async fn store_advance_result(
        &self,
        input: &Input,
        result: &AdvanceResult,
    ) -> Result<(), RepositoryError>;

    /// Move every closed epoch without unprocessed inputs to
    /// `processed_all_inputs`. Returns how many epochs moved.
    async fn promote_closed_epochs_fully_processed(
        &self,
        app: Address,
    ) -> Result<u64, RepositoryError>;

    // =========================================================================
    // VALIDATOR
    // =========================================================================

    /// Epochs in `processed_all_inputs` or later, ordered by index.
    async fn get_processed_epochs(&self, app: Address) -> Result<Vec<Epoch>, RepositoryError>;

    /// Outputs whose producing input lies in `[first_block, last_block]`,
    /// ordered by output index.
    async fn get_outputs_produced_in_block_range(
        &self,
        app: Address,
        first_block: u64,
        last_block: u64,
    ) -> Result<Vec<Output>, RepositoryError>;

    async fn count_unprocessed_inputs_in_block_range(
        &self,
        app: Address,
        first_block: u64,
        last_block: u64,
    ) -> Result<u64, RepositoryError>;

    /// The epoch with index `epoch.index - 1`, if any.
    async fn get_previous_epoch(&self, epoch: &Epoch) -> Result<Option<Epoch>, RepositoryError>;

    /// The highest-indexed input of the epoch.
    async fn get_last_input(&self, epoch: &Epoch) -> Result<Option<Input>, RepositoryError>;

    /// `outputs_hash` of the epoch's last input. Fails unless the stored
    /// epoch is in `processed_all_inputs`.
    async fn get_last_input_outputs_hash(
        &self,
        epoch: &Epoch,
    ) -> Result<Option<Hash>, RepositoryError>;

    /// Record the claim, move the epoch to `claim_computed` and store each
    /// output's hash and sibling path.
    async fn set_epoch_claim_and_insert_proofs(
        &self,
        epoch: &Epoch,
        claim_hash: Hash,
        outputs: &[Output],
    ) -> Result<(), RepositoryError>;

    // =========================================================================
    // CLAIMER
    // =========================================================================

    /// All epochs in `claim_computed`, ordered by application and index.
    async fn select_computed_claims(&self) -> Result<Vec<ComputedClaim>, RepositoryError>;

    /// Move an epoch from `claim_computed` to `claim_submitted`.
    async fn update_epoch_with_submitted_claim(
        &self,
        epoch_id: u64,
        transaction_hash: Hash,
    ) -> Result<(), RepositoryError>;

    // =========================================================================
    // WATCHERS
    // =========================================================================

    /// Move the submitted epoch ending at `last_block` with this claim to
    /// `claim_accepted`. Returns whether such an epoch existed.
    async fn update_epoch_with_accepted_claim(
        &self,
        app: Address,
        last_block: u64,
        claim_hash: Hash,
        transaction_hash: Hash,
    ) -> Result<bool, RepositoryError>;

    /// Record the L1 transaction that executed an output. Returns whether
    /// the output is known.
    async fn update_output_executed(
        &self,
        app: Address,
        output_index: u64,
        transaction_hash: Hash,
    ) -> Result<bool, RepositoryError>;
}
