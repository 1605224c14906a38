//! # Output Waiter
//!
//! Outputs of a block range are only complete once every input in that
//! range has been advanced. The Validator uses this to avoid building a
//! tree over a partial leaf set.

use std::time::Duration;

use shared_types::{Address, Output};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::domain::errors::RepositoryError;
use crate::ports::inbound::Repository;

/// Poll until no input in `[first_block, last_block]` is unprocessed, then
/// return the outputs those inputs produced.
///
/// Fails with [`RepositoryError::WaitTimeout`] instead of returning a
/// partial set.
pub async fn wait_for_outputs_in_block_range(
    repo: &dyn Repository,
    app: Address,
    first_block: u64,
    last_block: u64,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Vec<Output>, RepositoryError> {
    let started = Instant::now();

    loop {
        let pending = repo
            .count_unprocessed_inputs_in_block_range(app, first_block, last_block)
            .await?;
        if pending == 0 {
            return repo
                .get_outputs_produced_in_block_range(app, first_block, last_block)
                .await;
        }

        let waited = started.elapsed();
        if waited >= timeout {
            return Err(RepositoryError::WaitTimeout {
                first_block,
                last_block,
                waited_ms: waited.as_millis(),
            });
        }
        debug!(
            pending,
            first_block, last_block, "[rn-01] Waiting for inputs to be processed"
        );
        sleep(poll_interval.min(timeout - waited)).await;
    }
}
