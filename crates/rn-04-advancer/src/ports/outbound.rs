//! # Outbound Ports (Driven Ports / SPI)
//!
//! The VM instances the advancer drives, one per application.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::{keccak256, keccak256_concat, MerkleTree, MAX_OUTPUT_TREE_HEIGHT};
use shared_types::{Address, AdvanceResult, Hash, InputCompletionStatus};

use crate::domain::errors::MachineError;

/// Applications mapped to their VM handles.
///
/// `advance` is deterministic given the payload and the machine's prior
/// state. `Err` means the machine could not be reached or answered
/// nonsense; a rejected or limit-exceeded input is an `Ok` result carrying
/// that status.
#[async_trait]
pub trait Machines: Send + Sync {
    /// Applications with a loaded machine.
    fn apps(&self) -> Vec<Address>;

    async fn advance(
        &self,
        app: Address,
        payload: &[u8],
        index: u64,
    ) -> Result<AdvanceResult, MachineError>;
}

// =============================================================================
// ECHO MACHINE
// =============================================================================

#[derive(Default)]
struct EchoState {
    leaves: Vec<Hash>,
    machine_hash: Hash,
    next_index: u64,
}

/// Echo VM for tests.
///
/// An accepted input yields one output and one report, both equal to the
/// payload. The machine hash chains `keccak(previous || payload)` and the
/// outputs hash commits to every output so far together with the machine
/// hash, which is exactly the claim the validator will recompute.
///
/// Payloads registered with [`MockMachine::script`] finish with the given
/// status instead and leave the state untouched.
pub struct MockMachine {
    states: Mutex<HashMap<Address, EchoState>>,
    scripted: Mutex<HashMap<Vec<u8>, InputCompletionStatus>>,
    fail_next: Mutex<u64>,
}

impl MockMachine {
    pub fn new(apps: impl IntoIterator<Item = Address>) -> Self {
        Self {
            states: Mutex::new(
                apps.into_iter()
                    .map(|app| (app, EchoState::default()))
                    .collect(),
            ),
            scripted: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(0),
        }
    }

    /// Finish `payload` with `status` instead of echoing it.
    pub fn script(&self, payload: &[u8], status: InputCompletionStatus) {
        self.scripted.lock().insert(payload.to_vec(), status);
    }

    /// Fail the next `count` advances with a transport error.
    pub fn fail_next_advances(&self, count: u64) {
        *self.fail_next.lock() = count;
    }

    /// Inputs advanced so far for `app`.
    pub fn advanced(&self, app: Address) -> u64 {
        self.states
            .lock()
            .get(&app)
            .map_or(0, |state| state.next_index)
    }
}

#[async_trait]
impl Machines for MockMachine {
    fn apps(&self) -> Vec<Address> {
        let mut apps: Vec<Address> = self.states.lock().keys().copied().collect();
        apps.sort();
        apps
    }

    async fn advance(
        &self,
        app: Address,
        payload: &[u8],
        index: u64,
    ) -> Result<AdvanceResult, MachineError> {
        {
            let mut fail_next = self.fail_next.lock();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(MachineError::Transport("connection refused".into()));
            }
        }
        let scripted = self.scripted.lock().get(payload).copied();

        let mut states = self.states.lock();
        let state = states
            .get_mut(&app)
            .ok_or(MachineError::UnknownApplication(app))?;
        if index != state.next_index {
            return Err(MachineError::Decode(format!(
                "expected input {}, got {index}",
                state.next_index
            )));
        }
        state.next_index += 1;

        let status = scripted.unwrap_or(InputCompletionStatus::Accepted);
        let (outputs, reports) = if status == InputCompletionStatus::Accepted {
            state.leaves.push(keccak256(payload));
            state.machine_hash = keccak256_concat(&[&state.machine_hash, payload]);
            (vec![payload.to_vec()], vec![payload.to_vec()])
        } else {
            (Vec::new(), Vec::new())
        };

        let root = MerkleTree::build(state.leaves.clone(), MAX_OUTPUT_TREE_HEIGHT)
            .map_err(|e| MachineError::Decode(e.to_string()))?
            .root();
        Ok(AdvanceResult {
            status,
            outputs,
            reports,
            outputs_hash: keccak256_concat(&[&root, &state.machine_hash]),
            machine_hash: Some(state.machine_hash),
        })
    }
}
