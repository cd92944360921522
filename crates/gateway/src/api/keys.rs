//! API-key lifecycle. The plaintext key is returned exactly once at
//! creation; afterwards only the prefix is visible.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

use super::auth::AuthUser;
use super::error_response;

pub async fn create_key(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> Response {
    let (plain, record) = state.api_keys.generate(&user.0 .0);
    Json(json!({
        "api_key": plain,
        "prefix": record.prefix,
        "created_at": record.created_at,
    }))
    .into_response()
}

/// Unauthenticated first-key bootstrap: only valid while no key exists.
#[derive(Debug, Deserialize)]
pub struct BootstrapBody {
    pub user_id: String,
}

pub async fn bootstrap_key(
    State(state): State<AppState>,
    Json(body): Json<BootstrapBody>,
) -> Response {
    if state.api_keys.count() > 0 {
        return error_response(&spool_domain::Error::Auth(
            "bootstrap is only available before any key has been issued".into(),
        ));
    }
    let (plain, record) = state.api_keys.generate(&body.user_id);
    tracing::info!(user_id = %body.user_id, prefix = %record.prefix, "bootstrap API key issued");
    Json(json!({
        "api_key": plain,
        "prefix": record.prefix,
        "created_at": record.created_at,
    }))
    .into_response()
}

pub async fn list_keys(State(state): State<AppState>, user: axum::Extension<AuthUser>) -> Response {
    let keys: Vec<_> = state
        .api_keys
        .list(&user.0 .0)
        .into_iter()
        .map(|record| {
            json!({
                "prefix": record.prefix,
                "is_active": record.is_active,
                "created_at": record.created_at,
                "revoked_at": record.revoked_at,
            })
        })
        .collect();
    Json(json!({ "keys": keys })).into_response()
}

pub async fn revoke_key(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(prefix): Path<String>,
) -> Response {
    // Only the owner may revoke a key.
    let owned = state
        .api_keys
        .list(&user.0 .0)
        .iter()
        .any(|record| record.prefix == prefix);
    if !owned {
        return error_response(&spool_domain::Error::NotFound(format!("key {prefix}")));
    }
    state.api_keys.revoke(&prefix);
    Json(json!({ "revoked": true, "prefix": prefix })).into_response()
}
