//! Periodic expiry sweep for consumer-side Actions: anything still
//! pending past its deadline is marked `expired` and its parent run
//! failed with a diagnostic.

use spool_domain::entity::{Action, ActionStatus, RunStatus};
use spool_domain::Result;
use spool_store::{ActionRepo, RunRepo};

use crate::state::AppState;

const EXPIRED_RESULT: &str = "expired: no tool output was submitted before the deadline";

pub fn spawn_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    let interval = std::time::Duration::from_secs(state.config.engine.sweep_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            sweep_once(&state).await;
        }
    })
}

/// One sweep pass. Separated from the task loop so tests can drive it.
pub async fn sweep_once(state: &AppState) {
    let now = chrono::Utc::now();
    let expired = match state.actions.expired_actions(now).await {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(error = %e, "action expiry scan failed");
            return;
        }
    };

    for action in expired {
        if let Err(e) = expire_action(state, &action).await {
            tracing::warn!(action_id = %action.id, error = %e, "action expiry failed");
        }
    }
}

async fn expire_action(state: &AppState, action: &Action) -> Result<()> {
    state
        .actions
        .complete_action(&action.id, EXPIRED_RESULT, ActionStatus::Expired)
        .await?;
    state
        .runs
        .set_run_error(
            &action.run_id,
            &format!(
                "action {} ({}) expired awaiting tool output",
                action.id, action.tool_name
            ),
        )
        .await?;
    // The run may have reached another terminal state in the meantime.
    if let Err(e) = state
        .runs
        .update_run_status(&action.run_id, RunStatus::Failed)
        .await
    {
        tracing::debug!(run_id = %action.run_id, error = %e, "run already terminal during expiry");
    }
    tracing::info!(
        action_id = %action.id,
        run_id = %action.run_id,
        tool = %action.tool_name,
        "pending action expired"
    );
    Ok(())
}
