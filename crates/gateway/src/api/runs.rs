//! Run lifecycle endpoints: creation, inspection, cancellation, the
//! named-event SSE subscription, and replay of the mirrored chunk stream.

use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_core::Stream;
use serde::Deserialize;
use serde_json::json;
use spool_domain::entity::{ActionStatus, Run, RunStatus};
use spool_store::{ActionRepo, AssistantRepo, RunRepo, ThreadRepo};

use crate::runtime::cancel::request_cancel;
use crate::state::AppState;

use super::auth::AuthUser;
use super::error_response;

const EVENT_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
pub struct CreateRunBody {
    pub thread_id: String,
    pub assistant_id: String,
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn create_run(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateRunBody>,
) -> Response {
    // The thread must exist; the assistant supplies the model default and
    // the instruction snapshot.
    if let Err(e) = state.threads.get_thread(&body.thread_id).await {
        return error_response(&e);
    }
    let assistant = match state.assistants.get_assistant(&body.assistant_id).await {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };

    let model = body
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| assistant.model.clone());
    let run = Run::new(
        &body.thread_id,
        &assistant.id,
        &user.0 .0,
        model,
        &assistant.instructions,
    );

    match state.runs.create_run(run).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    match state.runs.get_run(&run_id).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_runs(State(state): State<AppState>, Path(thread_id): Path<String>) -> Response {
    match state.runs.list_runs(&thread_id).await {
        Ok(runs) => Json(json!({ "runs": runs })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Request cancellation: flip the run to `cancelling`, write the shared
/// cancel flag, and nudge any local token. The run loop finishes the job.
pub async fn cancel_run(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    let run = match state.runs.get_run(&run_id).await {
        Ok(run) => run,
        Err(e) => return error_response(&e),
    };
    if run.status.is_terminal() {
        return error_response(&spool_domain::Error::Validation(format!(
            "run {run_id} is already terminal"
        )));
    }

    if let Err(e) = state
        .runs
        .update_run_status(&run_id, RunStatus::Cancelling)
        .await
    {
        return error_response(&e);
    }
    request_cancel(state.cache.as_ref(), &state.cancel_map, &run_id).await;

    // A queued run has no loop to notice the flag; resolve it here.
    if run.status == RunStatus::Queued && !state.cancel_map.is_running(&run_id) {
        let _ = state
            .runs
            .update_run_status(&run_id, RunStatus::Cancelled)
            .await;
    }

    match state.runs.get_run(&run_id).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Replay the mirrored chunk stream for a run (reconnect support).
pub async fn run_stream_replay(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    let chunks = state.events.replay(&run_id).await;
    Json(json!({ "run_id": run_id, "events": chunks })).into_response()
}

/// Named-event SSE subscription: polls run state every 500 ms and emits
/// `action_required`, `tool_invoked`, `run_ended`, `cancelled`, `error`.
/// Closes after a terminal event.
pub async fn run_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let mut last_status: Option<RunStatus> = None;
        let mut surfaced_actions: HashSet<String> = HashSet::new();

        loop {
            let run = match state.runs.get_run(&run_id).await {
                Ok(run) => run,
                Err(e) => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(json!({ "run_id": run_id, "message": e.to_string() }).to_string()));
                    break;
                }
            };

            // Tool invocations observed since the last poll.
            if let Ok(actions) = state.actions.list_actions(&run_id).await {
                for action in &actions {
                    if action.status != ActionStatus::Pending
                        && surfaced_actions.insert(action.id.clone())
                    {
                        yield Ok(Event::default()
                            .event("tool_invoked")
                            .data(json!({
                                "run_id": run_id,
                                "action_id": action.id,
                                "tool_name": action.tool_name,
                                "status": action.status,
                            }).to_string()));
                    }
                }
            }

            let status_changed = last_status != Some(run.status);
            last_status = Some(run.status);

            match run.status {
                RunStatus::PendingAction if status_changed => {
                    let pending = state
                        .actions
                        .pending_actions(&run_id)
                        .await
                        .unwrap_or_default();
                    yield Ok(Event::default()
                        .event("action_required")
                        .data(json!({ "run_id": run_id, "actions": pending }).to_string()));
                }
                RunStatus::Completed => {
                    yield Ok(Event::default()
                        .event("run_ended")
                        .data(json!({ "run_id": run_id, "status": "completed" }).to_string()));
                    break;
                }
                RunStatus::Cancelled => {
                    yield Ok(Event::default()
                        .event("cancelled")
                        .data(json!({ "run_id": run_id }).to_string()));
                    break;
                }
                RunStatus::Failed | RunStatus::Expired => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(json!({
                            "run_id": run_id,
                            "message": run.error.unwrap_or_else(|| "run failed".into()),
                        }).to_string()));
                    break;
                }
                _ => {}
            }

            tokio::time::sleep(EVENT_POLL).await;
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
