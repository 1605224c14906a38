//! # In-Memory Repository
//!
//! Full `Repository` contract over plain maps. Every operation takes the
//! single table lock once, validates, then applies, so a failed call leaves
//! no trace. Used by unit and end-to-end tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    AdvanceResult, Address, Application, ApplicationStatus, ComputedClaim, Epoch, EpochInputs,
    EpochStatus, Hash, Input, InputCompletionStatus, Output, Report,
};

use crate::domain::errors::RepositoryError;
use crate::domain::rules::{self, BatchPlan};
use crate::ports::inbound::Repository;

#[derive(Debug, Default)]
struct Tables {
    last_id: u64,
    applications: BTreeMap<Address, Application>,
    epochs: BTreeMap<u64, Epoch>,
    inputs: BTreeMap<u64, Input>,
    outputs: BTreeMap<u64, Output>,
    reports: BTreeMap<u64, Report>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn application(&self, app: Address) -> Result<&Application, RepositoryError> {
        self.applications
            .get(&app)
            .ok_or(RepositoryError::ApplicationNotFound(app))
    }

    fn application_mut(&mut self, app: Address) -> Result<&mut Application, RepositoryError> {
        self.applications
            .get_mut(&app)
            .ok_or(RepositoryError::ApplicationNotFound(app))
    }

    fn epochs_of(&self, app: Address) -> impl Iterator<Item = &Epoch> + '_ {
        self.epochs
            .values()
            .filter(move |epoch| epoch.application_address == app)
    }

    fn epoch_by_index(&self, app: Address, index: u64) -> Option<&Epoch> {
        self.epochs_of(app).find(|epoch| epoch.index == index)
    }

    fn inputs_of(&self, app: Address) -> impl Iterator<Item = &Input> + '_ {
        self.inputs
            .values()
            .filter(move |input| input.application_address == app)
    }

    fn outputs_of(&self, app: Address) -> impl Iterator<Item = &Output> + '_ {
        self.outputs.values().filter(move |output| {
            self.inputs
                .get(&output.input_id)
                .is_some_and(|input| input.application_address == app)
        })
    }

    fn stored_epoch(&self, epoch_id: u64) -> Result<&Epoch, RepositoryError> {
        self.epochs
            .get(&epoch_id)
            .ok_or(RepositoryError::EpochNotFound(epoch_id))
    }

    fn stored_epoch_mut(&mut self, epoch_id: u64) -> Result<&mut Epoch, RepositoryError> {
        self.epochs
            .get_mut(&epoch_id)
            .ok_or(RepositoryError::EpochNotFound(epoch_id))
    }

    fn apply_batch(&mut self, app: Address, plan: BatchPlan) -> Result<(), RepositoryError> {
        for mut epoch in plan.new_epochs {
            epoch.id = self.allocate_id();
            self.epochs.insert(epoch.id, epoch);
        }

        for index in plan.closed_epochs {
            let epoch_id = self
                .epoch_by_index(app, index)
                .map(|epoch| epoch.id)
                .ok_or(RepositoryError::EpochNotFound(index))?;
            self.stored_epoch_mut(epoch_id)?.status = EpochStatus::Closed;
        }

        for (epoch_index, mut input) in plan.inputs {
            input.epoch_id = self
                .epoch_by_index(app, epoch_index)
                .map(|epoch| epoch.id)
                .ok_or(RepositoryError::EpochNotFound(epoch_index))?;
            input.id = self.allocate_id();
            self.inputs.insert(input.id, input);
        }
        Ok(())
    }
}

/// Repository kept entirely in process memory.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Debug rendering of every table, for "nothing changed" assertions.
    pub fn snapshot(&self) -> String {
        format!("{:?}", *self.tables.lock())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn check_schema_version(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn insert_application(&self, app: &Application) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.lock();
        if tables.applications.contains_key(&app.contract_address) {
            return Err(RepositoryError::DuplicateApplication(app.contract_address));
        }
        let id = tables.allocate_id();
        tables.applications.insert(
            app.contract_address,
            Application {
                id,
                ..app.clone()
            },
        );
        Ok(id)
    }

    async fn get_application(
        &self,
        address: Address,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self.tables.lock().applications.get(&address).cloned())
    }

    async fn get_all_running_applications(&self) -> Result<Vec<Application>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .applications
            .values()
            .filter(|app| app.status == ApplicationStatus::Running)
            .cloned()
            .collect())
    }

    async fn get_last_processed_block(&self, app: Address) -> Result<u64, RepositoryError> {
        Ok(self.tables.lock().application(app)?.last_processed_block)
    }

    async fn update_last_claim_check_block(
        &self,
        app: Address,
        block: u64,
    ) -> Result<(), RepositoryError> {
        self.tables.lock().application_mut(app)?.last_claim_check_block = block;
        Ok(())
    }

    async fn update_last_output_check_block(
        &self,
        app: Address,
        block: u64,
    ) -> Result<(), RepositoryError> {
        self.tables.lock().application_mut(app)?.last_output_check_block = block;
        Ok(())
    }

    async fn store_epochs_and_inputs(
        &self,
        app: Address,
        epochs: Vec<EpochInputs>,
        last_processed_block: u64,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock();
        let current = tables.application(app)?.last_processed_block;
        rules::check_processed_block(app, current, last_processed_block)?;

        let stored: BTreeMap<u64, Epoch> = epochs
            .iter()
            .filter_map(|entry| tables.epoch_by_index(app, entry.epoch.index).cloned())
            .map(|epoch| (epoch.index, epoch))
            .collect();
        let last_epoch_index = tables.epochs_of(app).map(|epoch| epoch.index).max();
        let input_count = tables.inputs_of(app).count() as u64;

        let plan =
            rules::plan_epochs_and_inputs(app, &stored, last_epoch_index, input_count, epochs)?;
        tables.apply_batch(app, plan)?;
        tables.application_mut(app)?.last_processed_block = last_processed_block;
        Ok(())
    }

    async fn get_epoch(&self, app: Address, index: u64) -> Result<Option<Epoch>, RepositoryError> {
        Ok(self.tables.lock().epoch_by_index(app, index).cloned())
    }

    async fn get_input(&self, app: Address, index: u64) -> Result<Option<Input>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .inputs_of(app)
            .find(|input| input.index == index)
            .cloned())
    }

    async fn get_input_count(&self, app: Address) -> Result<u64, RepositoryError> {
        Ok(self.tables.lock().inputs_of(app).count() as u64)
    }

    async fn get_outputs_by_input(&self, input_id: u64) -> Result<Vec<Output>, RepositoryError> {
        let mut outputs: Vec<Output> = self
            .tables
            .lock()
            .outputs
            .values()
            .filter(|output| output.input_id == input_id)
            .cloned()
            .collect();
        outputs.sort_by_key(|output| output.index);
        Ok(outputs)
    }

    async fn get_reports_by_input(&self, input_id: u64) -> Result<Vec<Report>, RepositoryError> {
        let mut reports: Vec<Report> = self
            .tables
            .lock()
            .reports
            .values()
            .filter(|report| report.input_id == input_id)
            .cloned()
            .collect();
        reports.sort_by_key(|report| report.index);
        Ok(reports)
    }

    async fn get_unprocessed_inputs(
        &self,
        apps: &[Address],
    ) -> Result<HashMap<Address, Vec<Input>>, RepositoryError> {
        let tables = self.tables.lock();
        let mut by_app = HashMap::new();
        for app in apps {
            let mut inputs: Vec<Input> = tables
                .inputs_of(*app)
                .filter(|input| input.status == InputCompletionStatus::None)
                .filter(|input| {
                    tables
                        .epochs
                        .get(&input.epoch_id)
                        .is_some_and(|epoch| epoch.status != EpochStatus::Open)
                })
                .cloned()
                .collect();
            if !inputs.is_empty() {
                inputs.sort_by_key(|input| input.index);
                by_app.insert(*app, inputs);
            }
        }
        Ok(by_app)
    }

    async fn store_advance_result(
        &self,
        input: &Input,
        result: &AdvanceResult,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock();
        let stored = tables
            .inputs
            .get(&input.id)
            .ok_or(RepositoryError::InputNotFound(input.id))?;
        rules::check_advance_result(input.id, stored.status, result)?;

        let app = stored.application_address;
        let mut next_output_index = tables
            .outputs_of(app)
            .map(|output| output.index + 1)
            .max()
            .unwrap_or(0);

        for raw_data in &result.outputs {
            let id = tables.allocate_id();
            tables.outputs.insert(
                id,
                Output {
                    id,
                    input_id: input.id,
                    index: next_output_index,
                    raw_data: raw_data.clone(),
                    hash: None,
                    output_hashes_siblings: Vec::new(),
                    transaction_hash: None,
                },
            );
            next_output_index += 1;
        }

        for (index, raw_data) in result.reports.iter().enumerate() {
            let id = tables.allocate_id();
            tables.reports.insert(
                id,
                Report {
                    id,
                    input_id: input.id,
                    index: index as u64,
                    raw_data: raw_data.clone(),
                },
            );
        }

        let stored = tables
            .inputs
            .get_mut(&input.id)
            .ok_or(RepositoryError::InputNotFound(input.id))?;
        stored.status = result.status;
        stored.outputs_hash = Some(result.outputs_hash);
        stored.machine_hash = result.machine_hash;
        Ok(())
    }

    async fn promote_closed_epochs_fully_processed(
        &self,
        app: Address,
    ) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.lock();
        tables.application(app)?;

        let ready: Vec<u64> = tables
            .epochs_of(app)
            .filter(|epoch| epoch.status == EpochStatus::Closed)
            .filter(|epoch| {
                !tables.inputs.values().any(|input| {
                    input.epoch_id == epoch.id && input.status == InputCompletionStatus::None
                })
            })
            .map(|epoch| epoch.id)
            .collect();

        for epoch_id in &ready {
            tables.stored_epoch_mut(*epoch_id)?.status = EpochStatus::ProcessedAllInputs;
        }
        Ok(ready.len() as u64)
    }

    async fn get_processed_epochs(&self, app: Address) -> Result<Vec<Epoch>, RepositoryError> {
        let mut epochs: Vec<Epoch> = self
            .tables
            .lock()
            .epochs_of(app)
            .filter(|epoch| epoch.status >= EpochStatus::ProcessedAllInputs)
            .cloned()
            .collect();
        epochs.sort_by_key(|epoch| epoch.index);
        Ok(epochs)
    }

    async fn get_outputs_produced_in_block_range(
        &self,
        app: Address,
        first_block: u64,
        last_block: u64,
    ) -> Result<Vec<Output>, RepositoryError> {
        let tables = self.tables.lock();
        let mut outputs: Vec<Output> = tables
            .outputs_of(app)
            .filter(|output| {
                tables.inputs.get(&output.input_id).is_some_and(|input| {
                    (first_block..=last_block).contains(&input.block_number)
                })
            })
            .cloned()
            .collect();
        outputs.sort_by_key(|output| output.index);
        Ok(outputs)
    }

    async fn count_unprocessed_inputs_in_block_range(
        &self,
        app: Address,
        first_block: u64,
        last_block: u64,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .inputs_of(app)
            .filter(|input| input.status == InputCompletionStatus::None)
            .filter(|input| (first_block..=last_block).contains(&input.block_number))
            .count() as u64)
    }

    async fn get_previous_epoch(&self, epoch: &Epoch) -> Result<Option<Epoch>, RepositoryError> {
        let Some(previous) = epoch.index.checked_sub(1) else {
            return Ok(None);
        };
        Ok(self
            .tables
            .lock()
            .epoch_by_index(epoch.application_address, previous)
            .cloned())
    }

    async fn get_last_input(&self, epoch: &Epoch) -> Result<Option<Input>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .inputs
            .values()
            .filter(|input| input.epoch_id == epoch.id)
            .max_by_key(|input| input.index)
            .cloned())
    }

    async fn get_last_input_outputs_hash(
        &self,
        epoch: &Epoch,
    ) -> Result<Option<Hash>, RepositoryError> {
        let tables = self.tables.lock();
        let stored = tables.stored_epoch(epoch.id)?;
        if stored.status != EpochStatus::ProcessedAllInputs {
            return Err(RepositoryError::EpochNotProcessed {
                epoch_id: epoch.id,
                status: stored.status,
            });
        }
        Ok(tables
            .inputs
            .values()
            .filter(|input| input.epoch_id == epoch.id)
            .max_by_key(|input| input.index)
            .and_then(|input| input.outputs_hash))
    }

    async fn set_epoch_claim_and_insert_proofs(
        &self,
        epoch: &Epoch,
        claim_hash: Hash,
        outputs: &[Output],
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock();
        let stored = tables.stored_epoch(epoch.id)?;
        rules::check_transition(epoch.id, stored.status, EpochStatus::ClaimComputed)?;
        if let Some(missing) = outputs
            .iter()
            .find(|output| !tables.outputs.contains_key(&output.id))
        {
            return Err(RepositoryError::OutputNotFound(missing.id));
        }

        for output in outputs {
            if let Some(stored) = tables.outputs.get_mut(&output.id) {
                stored.hash = output.hash;
                stored.output_hashes_siblings = output.output_hashes_siblings.clone();
            }
        }
        let stored = tables.stored_epoch_mut(epoch.id)?;
        stored.claim_hash = Some(claim_hash);
        stored.status = EpochStatus::ClaimComputed;
        Ok(())
    }

    async fn select_computed_claims(&self) -> Result<Vec<ComputedClaim>, RepositoryError> {
        let tables = self.tables.lock();
        let mut claims = Vec::new();
        for epoch in tables
            .epochs
            .values()
            .filter(|epoch| epoch.status == EpochStatus::ClaimComputed)
        {
            let app = tables.application(epoch.application_address)?;
            let claim_hash = epoch.claim_hash.ok_or_else(|| {
                RepositoryError::Corrupt(format!("epoch {} is claim_computed without a claim", epoch.id))
            })?;
            claims.push(ComputedClaim {
                epoch_id: epoch.id,
                app_address: app.contract_address,
                iconsensus_address: app.iconsensus_address,
                epoch_index: epoch.index,
                first_block: epoch.first_block,
                last_block: epoch.last_block,
                claim_hash,
            });
        }
        claims.sort_by_key(|claim| (claim.app_address, claim.epoch_index));
        Ok(claims)
    }

    async fn update_epoch_with_submitted_claim(
        &self,
        epoch_id: u64,
        transaction_hash: Hash,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock();
        let stored = tables.stored_epoch_mut(epoch_id)?;
        rules::check_transition(epoch_id, stored.status, EpochStatus::ClaimSubmitted)?;
        stored.status = EpochStatus::ClaimSubmitted;
        stored.transaction_hash = Some(transaction_hash);
        Ok(())
    }

    async fn update_epoch_with_accepted_claim(
        &self,
        app: Address,
        last_block: u64,
        claim_hash: Hash,
        transaction_hash: Hash,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock();
        let Some(epoch_id) = tables
            .epochs_of(app)
            .find(|epoch| {
                epoch.last_block == last_block
                    && epoch.claim_hash == Some(claim_hash)
                    && epoch.status == EpochStatus::ClaimSubmitted
            })
            .map(|epoch| epoch.id)
        else {
            return Ok(false);
        };

        let stored = tables.stored_epoch_mut(epoch_id)?;
        stored.status = EpochStatus::ClaimAccepted;
        stored.transaction_hash = Some(transaction_hash);
        Ok(true)
    }

    async fn update_output_executed(
        &self,
        app: Address,
        output_index: u64,
        transaction_hash: Hash,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock();
        let Some(output_id) = tables
            .outputs_of(app)
            .find(|output| output.index == output_index)
            .map(|output| output.id)
        else {
            return Ok(false);
        };

        if let Some(output) = tables.outputs.get_mut(&output_id) {
            output.transaction_hash = Some(transaction_hash);
        }
        Ok(true)
    }
}
