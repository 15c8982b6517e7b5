//! Single entry point for fleet runs.
//!
//! The scheduler, the HTTP trigger and the `run-once` command all go through
//! [`execute_run`], so at most one run executes at a time and every completed
//! run becomes the "last run".

use time::{Date, OffsetDateTime};
use tracing::info;

use seastreak_core::RunSummary;

use crate::state::AppState;

/// Errors from starting or executing a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("A run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Failed(#[from] seastreak_core::Error),
}

/// Run the daily check as of the current UTC date.
pub async fn execute_run_now(state: &AppState) -> Result<RunSummary, RunError> {
    execute_run(state, OffsetDateTime::now_utc().date()).await
}

/// Run the daily check as of `today`.
pub async fn execute_run(state: &AppState, today: Date) -> Result<RunSummary, RunError> {
    let _guard = state.runs.try_begin().ok_or(RunError::AlreadyRunning)?;

    let summary = state.fleet.run_all(today, &state.shutdown).await?;

    info!(
        "Run for {} finished: {} incremented, {} broken, {} deferred",
        summary.run_date,
        summary.counters.streaks_incremented,
        summary.counters.streaks_broken,
        summary.counters.skipped_buffer_not_empty
    );
    *state.runs.last.write().await = Some(summary.clone());

    Ok(summary)
}
