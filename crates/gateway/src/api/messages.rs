//! Message endpoints, including consumer tool-output submission.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use spool_domain::entity::Message;
use spool_store::MessageRepo;

use crate::state::AppState;

use super::auth::AuthUser;
use super::error_response;

#[derive(Debug, Deserialize)]
pub struct CreateMessageBody {
    pub thread_id: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub assistant_id: Option<String>,
}

fn default_role() -> String {
    "user".into()
}

pub async fn create_message(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateMessageBody>,
) -> Response {
    let mut message = Message::new(&body.thread_id, &body.role, &body.content, &user.0 .0);
    message.assistant_id = body.assistant_id;

    match state.messages.append_message(message).await {
        Ok(message) => {
            // Write-through: store first, then the history cache.
            state
                .context
                .append_history(&body.thread_id, &message.role, &message.content)
                .await;
            Json(message).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Response {
    match state.messages.get_message(&message_id).await {
        Ok(message) => Json(message).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.messages.list_messages(&thread_id, query.limit).await {
        Ok(messages) => Json(json!({ "messages": messages })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Consumer tool-output submission. Appends the `role=tool` message,
/// marks the Action completed, and leaves the run ready to resume.
/// Re-submission for an already-completed Action is a no-op.
#[derive(Debug, Deserialize)]
pub struct ToolOutputBody {
    pub thread_id: String,
    pub content: String,
    pub tool_id: String,
    #[serde(default = "default_tool_role")]
    pub role: String,
    pub assistant_id: String,
}

fn default_tool_role() -> String {
    "tool".into()
}

pub async fn submit_tool_output(
    State(state): State<AppState>,
    Json(body): Json<ToolOutputBody>,
) -> Response {
    if body.role != "tool" {
        return error_response(&spool_domain::Error::Validation(format!(
            "tool output role must be 'tool', got '{}'",
            body.role
        )));
    }

    let action = match state.router.action_for_submission(&body.tool_id).await {
        Ok(action) => action,
        Err(e) => return error_response(&e),
    };

    match state
        .router
        .submit_tool_output(
            &body.thread_id,
            &body.assistant_id,
            &body.content,
            &action.id,
            false,
        )
        .await
    {
        Ok(action) => Json(json!({ "submitted": true, "action": action })).into_response(),
        Err(e) => error_response(&e),
    }
}
