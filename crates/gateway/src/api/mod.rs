//! HTTP surface: the completions streaming endpoint, run-event
//! subscriptions, tool-output submission, and the CRUD routers, all
//! behind `X-API-Key` auth.

pub mod actions;
pub mod assistants;
pub mod auth;
pub mod completions;
pub mod keys;
pub mod messages;
pub mod runs;
pub mod threads;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::json;
use spool_domain::Error;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Map a domain error to a structured HTTP response.
pub fn error_response(e: &Error) -> Response {
    let (status, error_type) = match e {
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        Error::Auth(_) => (StatusCode::UNAUTHORIZED, "auth_error"),
        Error::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    (
        status,
        Json(json!({
            "error": { "type": error_type, "message": e.to_string() }
        })),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        // Inference
        .route("/v1/completions", post(completions::completions))
        // Runs
        .route("/v1/runs", post(runs::create_run))
        .route("/v1/runs/:run_id", get(runs::get_run))
        .route("/v1/runs/:run_id/cancel", post(runs::cancel_run))
        .route("/v1/runs/:run_id/events", get(runs::run_events))
        .route("/v1/runs/:run_id/stream", get(runs::run_stream_replay))
        .route("/v1/runs/:run_id/actions", get(actions::list_run_actions))
        // Threads & messages
        .route("/v1/threads", post(threads::create_thread).get(threads::list_threads))
        .route(
            "/v1/threads/:thread_id",
            get(threads::get_thread).delete(threads::delete_thread),
        )
        .route("/v1/threads/:thread_id/messages", get(messages::list_messages))
        .route("/v1/threads/:thread_id/runs", get(runs::list_runs))
        .route("/v1/messages", post(messages::create_message))
        .route("/v1/messages/tools", post(messages::submit_tool_output))
        .route("/v1/messages/:message_id", get(messages::get_message))
        // Assistants & their tool catalog
        .route(
            "/v1/assistants",
            post(assistants::create_assistant).get(assistants::list_assistants),
        )
        .route(
            "/v1/assistants/:assistant_id",
            get(assistants::get_assistant)
                .post(assistants::update_assistant)
                .delete(assistants::delete_assistant),
        )
        .route(
            "/v1/assistants/:assistant_id/tools",
            get(assistants::list_tools).post(assistants::add_tool),
        )
        .route(
            "/v1/assistants/:assistant_id/tools/:tool_name",
            delete(assistants::remove_tool),
        )
        // Actions
        .route("/v1/actions/:action_id", get(actions::get_action))
        // API keys (self-service)
        .route("/v1/keys", post(keys::create_key).get(keys::list_keys))
        .route("/v1/keys/:prefix", delete(keys::revoke_key))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    // Unauthenticated: health probe and first-key bootstrap.
    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/keys/bootstrap", post(keys::bootstrap_key));

    Router::new()
        .merge(authed)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
