//! The per-run orchestration loop: open a provider stream, normalize it,
//! fan events out to the caller and the event bus, route tool calls, and
//! loop until the run reaches a terminal state or parks for consumer
//! tool output.

use futures_util::StreamExt;
use spool_domain::chunk::{StreamChunk, ToolCallPayload};
use spool_domain::entity::{Message, Run, RunStatus};
use spool_domain::{Error, Result};
use spool_providers::{CompletionRequest, Normalizer};
use spool_store::{MessageRepo, RunRepo};
use tokio::sync::mpsc;

use crate::state::AppState;

use super::cancel::{spawn_cancel_watch, CancelToken};
use super::context::BuildOptions;
use super::events::Emitter;
use super::platform::error_payload;
use super::router;

/// Input to one completions request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub thread_id: String,
    pub assistant_id: String,
    /// The triggering user message (already appended to the thread).
    pub message_id: Option<String>,
    /// Model override; defaults to the run's snapshot, then the
    /// assistant's configured model.
    pub model: Option<String>,
    /// Caller-supplied upstream API key. Scoped to this run only.
    pub api_key: Option<String>,
}

/// Start (or resume) a run. Returns the caller's chunk channel; the run
/// itself executes on a spawned task and also feeds the event bus.
pub fn start_run(state: AppState, req: RunRequest) -> mpsc::Receiver<StreamChunk> {
    let (tx, rx) = mpsc::channel::<StreamChunk>(64);
    let emitter = Emitter {
        tx,
        bus: state.events.clone(),
    };

    let span = tracing::info_span!("run", run_id = %req.run_id);
    tokio::spawn(tracing::Instrument::instrument(async move {
        let run_id = req.run_id.clone();

        if let Err(e) = run_loop(&state, &req, &emitter).await {
            tracing::warn!(%run_id, error = %e, "run failed");
            let _ = state.runs.set_run_error(&run_id, &e.to_string()).await;
            let _ = state
                .runs
                .update_run_status(&run_id, RunStatus::Failed)
                .await;
            emitter
                .emit(StreamChunk::Error {
                    content: error_payload(&e, state.config.engine.surface_traceback),
                    run_id: run_id.clone(),
                })
                .await;
        }

        state.cancel_map.remove(&run_id);
        state.events.cleanup(&run_id);
    }, span));

    rx
}

async fn run_loop(state: &AppState, req: &RunRequest, emitter: &Emitter) -> Result<()> {
    let run = state.runs.get_run(&req.run_id).await?;
    if run.thread_id != req.thread_id {
        return Err(Error::Validation(format!(
            "run {} does not belong to thread {}",
            run.id, req.thread_id
        )));
    }

    // Admission: fresh runs start, parked runs resume once their batch
    // has been answered, everything else is rejected.
    let run = match run.status {
        RunStatus::Queued => {
            state
                .runs
                .update_run_status(&run.id, RunStatus::InProgress)
                .await?
        }
        RunStatus::PendingAction => {
            let pending = state.router.pending_for_run(&run.id).await?;
            if !pending.is_empty() {
                return Err(Error::Validation(format!(
                    "run {} still has {} pending action(s)",
                    run.id,
                    pending.len()
                )));
            }
            state
                .runs
                .update_run_status(&run.id, RunStatus::InProgress)
                .await?
        }
        status if status.is_terminal() => {
            return Err(Error::Validation(format!(
                "run {} is already terminal ({status:?})",
                run.id
            )));
        }
        _ => {
            return Err(Error::Validation(format!(
                "run {} is already in progress",
                run.id
            )));
        }
    };

    emitter
        .emit(StreamChunk::Status {
            content: "in_progress".into(),
            run_id: run.id.clone(),
        })
        .await;

    let token = state.cancel_map.register(&run.id);
    let watch = spawn_cancel_watch(
        state.cache.clone(),
        token.clone(),
        run.id.clone(),
        state.config.engine.cancel_poll_ms,
    );

    let outcome = drive_run(state, req, &run, emitter, &token).await;
    watch.abort();
    outcome
}

/// Per-turn accumulation: plain text, isolated tool-block payload text,
/// and assembled native calls.
#[derive(Default)]
struct TurnBuffers {
    content: String,
    call_args: String,
    native_calls: Vec<ToolCallPayload>,
}

impl TurnBuffers {
    fn absorb(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Content { content, .. } => self.content.push_str(content),
            StreamChunk::CallArguments { content, .. } => self.call_args.push_str(content),
            StreamChunk::ToolCall { content, .. } => self.native_calls.push(content.clone()),
            _ => {}
        }
    }
}

async fn drive_run(
    state: &AppState,
    req: &RunRequest,
    run: &Run,
    emitter: &Emitter,
    token: &CancelToken,
) -> Result<()> {
    let assistant = state.context.assistant(&run.assistant_id, false).await?;

    let model = req
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .or_else(|| (!run.model.is_empty()).then(|| run.model.clone()))
        .unwrap_or_else(|| assistant.model.clone());

    let worker = state.workers.select(&model)?;
    let caps = worker.capabilities().clone();
    let max_turns = state.config.engine.max_turns;

    for turn in 1..=max_turns {
        if token.is_cancelled() {
            return finish_cancelled(state, run, emitter, "").await;
        }
        tracing::debug!(run_id = %run.id, turn, "turn started");

        let messages = state
            .context
            .build(
                state.messages.as_ref(),
                &run.assistant_id,
                &run.thread_id,
                caps.context_window,
                BuildOptions {
                    force_refresh: false,
                    amended: caps.native_tools,
                },
            )
            .await?;

        let creq = CompletionRequest {
            model: model.clone(),
            messages,
            tools: assistant.tools.clone(),
            temperature: None,
            max_tokens: None,
            api_key: req.api_key.clone(),
        };

        let mut stream = worker.open_stream(&creq).await?;
        let mut normalizer = Normalizer::new(run.id.clone());
        let mut buffers = TurnBuffers::default();
        let mut upstream_error: Option<Error> = None;

        while let Some(item) = stream.next().await {
            if token.is_cancelled() {
                drop(stream);
                return finish_cancelled(state, run, emitter, &buffers.content).await;
            }
            match item {
                Ok(delta) => {
                    for chunk in normalizer.feed(&delta) {
                        buffers.absorb(&chunk);
                        emitter.emit(chunk).await;
                    }
                }
                Err(e) => {
                    upstream_error = Some(e);
                    break;
                }
            }
        }
        drop(stream);

        if let Some(e) = upstream_error {
            // Keep whatever already streamed, then fail the run.
            persist_assistant_message(state, run, &buffers.content).await?;
            return Err(e);
        }

        for chunk in normalizer.finish() {
            buffers.absorb(&chunk);
            emitter.emit(chunk).await;
        }

        let calls = router::detect_calls(&buffers.native_calls, &buffers.call_args, &buffers.content);

        if calls.is_empty() {
            persist_assistant_message(state, run, &buffers.content).await?;
            state
                .runs
                .update_run_status(&run.id, RunStatus::Completed)
                .await?;
            emitter
                .emit(StreamChunk::Status {
                    content: "completed".into(),
                    run_id: run.id.clone(),
                })
                .await;
            tracing::info!(run_id = %run.id, turns = turn, "run completed");
            return Ok(());
        }

        // The turn produced tool calls: the assistant message is the
        // serialized call envelope.
        let envelope = serde_json::to_string(&calls)?;
        persist_assistant_message(state, run, &envelope).await?;

        let batch = state
            .router
            .dispatch_batch(run, turn, calls, &assistant, emitter)
            .await?;

        if batch.consumer_pending {
            emitter
                .emit(StreamChunk::Status {
                    content: "pending_action".into(),
                    run_id: run.id.clone(),
                })
                .await;
            tracing::info!(run_id = %run.id, turn, "run parked for consumer tool output");
            return Ok(());
        }
    }

    Err(Error::Other(format!("max turns exceeded ({max_turns})")))
}

/// Persist a turn's assistant output (store first, then history cache).
async fn persist_assistant_message(state: &AppState, run: &Run, content: &str) -> Result<()> {
    if content.is_empty() {
        return Ok(());
    }
    let mut message = Message::new(&run.thread_id, "assistant", content, &run.assistant_id);
    message.assistant_id = Some(run.assistant_id.clone());
    message.run_id = Some(run.id.clone());
    state.messages.append_message(message).await?;
    state
        .context
        .append_history(&run.thread_id, "assistant", content)
        .await;
    Ok(())
}

/// Cancellation epilogue: partial content is persisted, the run walks
/// `cancelling → cancelled`, and the caller sees a terminal error frame.
async fn finish_cancelled(
    state: &AppState,
    run: &Run,
    emitter: &Emitter,
    partial: &str,
) -> Result<()> {
    if let Err(e) = persist_assistant_message(state, run, partial).await {
        tracing::warn!(run_id = %run.id, error = %e, "failed to persist partial content on cancel");
    }
    let _ = state
        .runs
        .update_run_status(&run.id, RunStatus::Cancelling)
        .await;
    let _ = state
        .runs
        .update_run_status(&run.id, RunStatus::Cancelled)
        .await;
    emitter
        .emit(StreamChunk::Error {
            content: "Run cancelled".into(),
            run_id: run.id.clone(),
        })
        .await;
    tracing::info!(run_id = %run.id, "run cancelled");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
