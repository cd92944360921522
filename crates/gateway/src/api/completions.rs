//! The inference streaming endpoint.
//!
//! `POST /v1/completions` starts (or resumes) a run and streams
//! `data: {json}\n\n` frames, terminating with `data: [DONE]\n\n` on
//! success or a final `error` frame on failure.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use spool_domain::chunk::StreamChunk;

use crate::runtime::{start_run, RunRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompletionsBody {
    pub run_id: String,
    pub thread_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    pub assistant_id: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Caller-supplied upstream key; used for this run only.
    #[serde(default)]
    pub api_key: Option<String>,
}

pub async fn completions(
    State(state): State<AppState>,
    Json(body): Json<CompletionsBody>,
) -> Response {
    tracing::info!(
        run_id = %body.run_id,
        thread_id = %body.thread_id,
        model = body.model.as_deref().unwrap_or("default"),
        "completions stream requested"
    );

    let rx = start_run(
        state,
        RunRequest {
            run_id: body.run_id,
            thread_id: body.thread_id,
            assistant_id: body.assistant_id,
            message_id: body.message_id,
            model: body.model,
            api_key: body.api_key,
        },
    );

    let stream = async_stream::stream! {
        let mut rx = rx;
        let mut errored = false;
        while let Some(chunk) = rx.recv().await {
            if matches!(chunk, StreamChunk::Error { .. }) {
                errored = true;
            }
            yield Ok::<_, std::convert::Infallible>(Bytes::from(format!(
                "data: {}\n\n",
                chunk.to_json()
            )));
        }
        if !errored {
            yield Ok(Bytes::from("data: [DONE]\n\n"));
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
