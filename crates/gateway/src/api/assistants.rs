//! Assistant CRUD plus the per-assistant tool catalog. Every mutation
//! invalidates both assistant cache tiers.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use spool_domain::chat::ToolDefinition;
use spool_domain::entity::{Assistant, ToolResources};
use spool_store::AssistantRepo;

use crate::state::AppState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct CreateAssistantBody {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_resources: ToolResources,
    #[serde(default)]
    pub web_access: bool,
    #[serde(default)]
    pub agent_mode: bool,
    #[serde(default)]
    pub deep_research: bool,
    #[serde(default)]
    pub decision_telemetry: bool,
}

pub async fn create_assistant(
    State(state): State<AppState>,
    Json(body): Json<CreateAssistantBody>,
) -> Response {
    let mut assistant = Assistant::new(body.name, body.model);
    assistant.instructions = body.instructions;
    assistant.tools = body.tools;
    assistant.tool_resources = body.tool_resources;
    assistant.web_access = body.web_access;
    assistant.agent_mode = body.agent_mode;
    assistant.deep_research = body.deep_research;
    assistant.decision_telemetry = body.decision_telemetry;

    match state.assistants.create_assistant(assistant).await {
        Ok(assistant) => Json(assistant).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn get_assistant(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
) -> Response {
    match state.assistants.get_assistant(&assistant_id).await {
        Ok(assistant) => Json(assistant).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAssistantBody {
    pub name: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_resources: Option<ToolResources>,
    pub web_access: Option<bool>,
    pub agent_mode: Option<bool>,
    pub deep_research: Option<bool>,
    pub decision_telemetry: Option<bool>,
}

pub async fn update_assistant(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
    Json(body): Json<UpdateAssistantBody>,
) -> Response {
    let mut assistant = match state.assistants.get_assistant(&assistant_id).await {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };

    if let Some(name) = body.name {
        assistant.name = name;
    }
    if let Some(model) = body.model {
        assistant.model = model;
    }
    if let Some(instructions) = body.instructions {
        assistant.instructions = instructions;
    }
    if let Some(tools) = body.tools {
        assistant.tools = tools;
    }
    if let Some(resources) = body.tool_resources {
        assistant.tool_resources = resources;
    }
    if let Some(v) = body.web_access {
        assistant.web_access = v;
    }
    if let Some(v) = body.agent_mode {
        assistant.agent_mode = v;
    }
    if let Some(v) = body.deep_research {
        assistant.deep_research = v;
    }
    if let Some(v) = body.decision_telemetry {
        assistant.decision_telemetry = v;
    }

    match state.assistants.update_assistant(assistant).await {
        Ok(assistant) => {
            state.context.invalidate_assistant(&assistant_id).await;
            Json(assistant).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn delete_assistant(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
) -> Response {
    match state.assistants.delete_assistant(&assistant_id).await {
        Ok(()) => {
            state.context.invalidate_assistant(&assistant_id).await;
            Json(json!({ "deleted": true, "id": assistant_id })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn list_assistants(State(state): State<AppState>) -> Response {
    match state.assistants.list_assistants().await {
        Ok(assistants) => Json(json!({ "assistants": assistants })).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Tool catalog ──────────────────────────────────────────────────

pub async fn list_tools(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
) -> Response {
    match state.assistants.get_assistant(&assistant_id).await {
        Ok(assistant) => Json(json!({ "tools": assistant.tools })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn add_tool(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
    Json(tool): Json<ToolDefinition>,
) -> Response {
    let mut assistant = match state.assistants.get_assistant(&assistant_id).await {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    if assistant.tools.iter().any(|t| t.name == tool.name) {
        return error_response(&spool_domain::Error::Validation(format!(
            "tool '{}' already registered on assistant {assistant_id}",
            tool.name
        )));
    }
    assistant.tools.push(tool);

    match state.assistants.update_assistant(assistant).await {
        Ok(assistant) => {
            state.context.invalidate_assistant(&assistant_id).await;
            Json(json!({ "tools": assistant.tools })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn remove_tool(
    State(state): State<AppState>,
    Path((assistant_id, tool_name)): Path<(String, String)>,
) -> Response {
    let mut assistant = match state.assistants.get_assistant(&assistant_id).await {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let before = assistant.tools.len();
    assistant.tools.retain(|t| t.name != tool_name);
    if assistant.tools.len() == before {
        return error_response(&spool_domain::Error::NotFound(format!(
            "tool '{tool_name}' on assistant {assistant_id}"
        )));
    }

    match state.assistants.update_assistant(assistant).await {
        Ok(_) => {
            state.context.invalidate_assistant(&assistant_id).await;
            Json(json!({ "deleted": true, "tool": tool_name })).into_response()
        }
        Err(e) => error_response(&e),
    }
}
