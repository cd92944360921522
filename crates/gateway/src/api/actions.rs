//! Action inspection endpoints.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use spool_store::ActionRepo;

use crate::state::AppState;

use super::error_response;

pub async fn get_action(State(state): State<AppState>, Path(action_id): Path<String>) -> Response {
    match state.actions.get_action(&action_id).await {
        Ok(action) => Json(action).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_run_actions(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    match state.actions.list_actions(&run_id).await {
        Ok(actions) => Json(json!({ "actions": actions })).into_response(),
        Err(e) => error_response(&e),
    }
}
