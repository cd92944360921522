//! Thread CRUD. Deletion cascades to messages and invalidates the
//! thread-history cache.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use spool_domain::entity::Thread;
use spool_store::ThreadRepo;
use std::collections::HashMap;

use crate::state::AppState;

use super::auth::AuthUser;
use super::error_response;

#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadBody {
    #[serde(default)]
    pub meta_data: HashMap<String, Value>,
}

pub async fn create_thread(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    body: Option<Json<CreateThreadBody>>,
) -> Response {
    let mut thread = Thread::new(&user.0 .0);
    if let Some(Json(body)) = body {
        thread.meta_data = body.meta_data;
    }
    match state.threads.create_thread(thread).await {
        Ok(thread) => Json(thread).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn get_thread(State(state): State<AppState>, Path(thread_id): Path<String>) -> Response {
    match state.threads.get_thread(&thread_id).await {
        Ok(thread) => Json(thread).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Response {
    match state.threads.delete_thread(&thread_id).await {
        Ok(()) => {
            state.context.invalidate_history(&thread_id).await;
            Json(json!({ "deleted": true, "id": thread_id })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn list_threads(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> Response {
    match state.threads.list_threads(&user.0 .0).await {
        Ok(threads) => Json(json!({ "threads": threads })).into_response(),
        Err(e) => error_response(&e),
    }
}
