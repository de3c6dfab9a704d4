pub mod handlers;
pub mod lease;
pub mod orchestrator;

use tracing::warn;

use crate::run::orchestrator::{execute_run, RunContext, RunError, RunSummary};
use crate::state::AppState;

/// Runs one scoring pass under the Redis lease, if one is configured.
pub async fn trigger_run(state: &AppState) -> Result<RunSummary, RunError> {
    let guard = match &state.lease {
        Some(lease) => Some(lease.acquire().await?.ok_or(RunError::InProgress)?),
        None => None,
    };

    let ctx = RunContext {
        store: state.store.as_ref(),
        publisher: state.publisher.as_ref(),
        scoring: &state.config.scoring,
        labels: &state.config.labels,
    };
    let result = execute_run(&ctx).await;

    if let Some(guard) = guard {
        // The TTL frees the lease anyway if this fails.
        if let Err(e) = guard.release().await {
            warn!("Failed to release run lease: {e}");
        }
    }

    result
}
