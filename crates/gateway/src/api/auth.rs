//! `X-API-Key` verification middleware. Keys are verified against the
//! hashed store in constant time; the resolved user id travels with the
//! request as an extension.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::state::AppState;

/// The authenticated caller, inserted by the middleware.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

pub async fn require_api_key(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !state.config.auth.require_api_key {
        req.extensions_mut().insert(AuthUser("dev".into()));
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match presented.and_then(|key| state.api_keys.verify(key)) {
        Some(user_id) => {
            req.extensions_mut().insert(AuthUser(user_id));
            next.run(req).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": { "type": "auth_error", "message": "missing or invalid API key" }
            })),
        )
            .into_response(),
    }
}
