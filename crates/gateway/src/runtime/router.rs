//! The tool-call router: turns a finished model turn into validated
//! function calls, classifies them platform vs consumer, and drives the
//! Action lifecycle around dispatch.
//!
//! Detection precedence is fixed: native structured calls win outright;
//! the inline passes (assembled tool-block payload, `<fc>` regex over the
//! reply, loose JSON scan) run only when the turn produced no native
//! call, and the first validated hit is authoritative.

use std::sync::Arc;

use serde_json::Value;
use spool_domain::chat::FunctionCall;
use spool_domain::chunk::ToolCallPayload;
use spool_domain::entity::{new_id, Action, ActionStatus, Message, Run, RunStatus};
use spool_domain::{Error, Result};
use spool_store::{ActionRepo, MessageRepo, RunRepo};

use super::calls;
use super::context::{CachedAssistant, ContextBuilder};
use super::events::Emitter;
use super::platform::{is_platform_tool, ExecutionContext, PlatformTools};

const ERROR_NO_CONTENT: &str = "ERROR: tool produced no content";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Platform,
    Consumer,
}

pub fn classify(name: &str) -> Dispatch {
    if is_platform_tool(name) {
        Dispatch::Platform
    } else {
        Dispatch::Consumer
    }
}

/// Detection passes over one finished turn. `native` are the assembled
/// structured calls, `call_args` the text the normalizer isolated from
/// inline tool blocks, `reply` the plain assistant text.
pub fn detect_calls(
    native: &[ToolCallPayload],
    call_args: &str,
    reply: &str,
) -> Vec<FunctionCall> {
    // Pass 1: native structured calls (possibly a batch).
    if !native.is_empty() {
        return native
            .iter()
            .map(|payload| FunctionCall {
                name: payload.name.clone(),
                arguments: payload
                    .arguments_json()
                    .or_else(|| calls::ensure_valid_json(&payload.arguments))
                    .unwrap_or_else(|| Value::Object(Default::default())),
                call_id: payload.call_id.clone(),
            })
            .collect();
    }

    // Pass 2: the normalizer already stripped the markup; the remaining
    // payload text is the call body.
    if !call_args.trim().is_empty() {
        if let Some(parsed) = calls::ensure_valid_json(call_args) {
            if calls::validate_call(&parsed) {
                if let Some(call) = to_function_call(&parsed) {
                    return vec![call];
                }
            }
        }
    }

    // Pass 3: a complete <fc> block embedded in the reply text.
    if let Some(parsed) = calls::extract_fc_block(reply) {
        if let Some(call) = to_function_call(&parsed) {
            return vec![call];
        }
    }

    // Pass 4: legacy loose JSON scan.
    if let Some(parsed) = calls::extract_loose_calls(reply).into_iter().next() {
        if let Some(call) = to_function_call(&parsed) {
            return vec![call];
        }
    }

    Vec::new()
}

fn to_function_call(obj: &Value) -> Option<FunctionCall> {
    Some(FunctionCall {
        name: obj.get("name")?.as_str()?.to_string(),
        arguments: obj.get("arguments").cloned().unwrap_or(Value::Null),
        call_id: None,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct BatchResult {
    /// At least one call was consumer-side; the run is parked in
    /// `pending_action` awaiting tool output submission.
    pub consumer_pending: bool,
}

pub struct ToolRouter {
    actions: Arc<dyn spool_store::ActionRepo>,
    runs: Arc<dyn spool_store::RunRepo>,
    messages: Arc<dyn spool_store::MessageRepo>,
    context: Arc<ContextBuilder>,
    platform: Arc<PlatformTools>,
    action_ttl_secs: i64,
}

impl ToolRouter {
    pub fn new(
        actions: Arc<dyn spool_store::ActionRepo>,
        runs: Arc<dyn spool_store::RunRepo>,
        messages: Arc<dyn spool_store::MessageRepo>,
        context: Arc<ContextBuilder>,
        platform: Arc<PlatformTools>,
        action_ttl_secs: i64,
    ) -> Self {
        Self {
            actions,
            runs,
            messages,
            context,
            platform,
            action_ttl_secs,
        }
    }

    /// Dispatch one turn's batch: persist an Action per call, execute the
    /// platform-side ones inline, park the run when any call is
    /// consumer-side. Calls are processed in emission order.
    pub async fn dispatch_batch(
        &self,
        run: &Run,
        turn_index: u32,
        batch: Vec<FunctionCall>,
        assistant: &CachedAssistant,
        emitter: &Emitter,
    ) -> Result<BatchResult> {
        // Persist every Action first so the batch is visible as a unit.
        let mut planned = Vec::with_capacity(batch.len());
        for call in batch {
            let tool_call_id = call
                .call_id
                .clone()
                .unwrap_or_else(|| new_id("call"));
            let action = self
                .actions
                .create_action(Action::new(
                    &run.id,
                    &tool_call_id,
                    &call.name,
                    turn_index,
                    call.arguments.clone(),
                    self.action_ttl_secs,
                ))
                .await?;
            tracing::debug!(
                run_id = %run.id,
                action_id = %action.id,
                tool = %call.name,
                "action created"
            );
            planned.push((call, action));
        }

        let consumer_pending = planned
            .iter()
            .any(|(call, _)| classify(&call.name) == Dispatch::Consumer);

        if consumer_pending {
            self.runs
                .update_run_status(&run.id, RunStatus::PendingAction)
                .await?;
        }

        for (call, action) in &planned {
            match classify(&call.name) {
                Dispatch::Platform => {
                    self.actions
                        .update_action_status(&action.id, ActionStatus::InProgress)
                        .await?;

                    let ctx = ExecutionContext {
                        run_id: &run.id,
                        thread_id: &run.thread_id,
                        assistant,
                        emitter,
                    };
                    let outcome = self
                        .platform
                        .execute(&call.name, &call.arguments, &ctx)
                        .await;

                    self.submit_tool_output(
                        &run.thread_id,
                        &assistant.id,
                        &outcome.content,
                        &action.id,
                        outcome.is_error,
                    )
                    .await?;
                }
                Dispatch::Consumer => {
                    // Left pending; the client polls run events and posts
                    // the result within the expiry window.
                    tracing::debug!(
                        run_id = %run.id,
                        action_id = %action.id,
                        tool = %call.name,
                        "consumer action surfaced"
                    );
                }
            }
        }

        Ok(BatchResult { consumer_pending })
    }

    /// Record tool output: append the `role=tool` message (store first,
    /// then history cache) and mark the Action terminal. Re-submission
    /// for an already-processed Action is a no-op.
    pub async fn submit_tool_output(
        &self,
        thread_id: &str,
        assistant_id: &str,
        content: &str,
        action_id: &str,
        is_error: bool,
    ) -> Result<Action> {
        let action = self.actions.get_action(action_id).await?;
        if action.processed_at.is_some() {
            return Ok(action);
        }

        let content = if content.is_empty() {
            ERROR_NO_CONTENT
        } else {
            content
        };

        let mut message = Message::new(thread_id, "tool", content, assistant_id);
        message.assistant_id = Some(assistant_id.to_string());
        message.run_id = Some(action.run_id.clone());
        message.tool_id = Some(action_id.to_string());
        self.messages.append_message(message).await?;
        self.context.append_history(thread_id, "tool", content).await;

        let status = if is_error {
            ActionStatus::Failed
        } else {
            ActionStatus::Completed
        };
        self.actions.complete_action(action_id, content, status).await
    }

    /// Resume gate: a parked run may continue only when no Actions are
    /// still pending.
    pub async fn pending_for_run(&self, run_id: &str) -> Result<Vec<Action>> {
        self.actions.pending_actions(run_id).await
    }

    /// Validation surface for the messages API: the Action must exist and
    /// belong to a run before output is accepted.
    pub async fn action_for_submission(&self, action_id: &str) -> Result<Action> {
        let action = self.actions.get_action(action_id).await?;
        if action.status == ActionStatus::Expired {
            return Err(Error::Validation(format!(
                "action {action_id} has expired"
            )));
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn native(name: &str, args: &str, id: &str) -> ToolCallPayload {
        ToolCallPayload {
            name: name.into(),
            arguments: args.into(),
            call_id: Some(id.into()),
        }
    }

    #[test]
    fn classify_table() {
        assert_eq!(classify("code_interpreter"), Dispatch::Platform);
        assert_eq!(classify("web_read"), Dispatch::Platform);
        assert_eq!(classify("file_search"), Dispatch::Platform);
        assert_eq!(classify("get_flight_times"), Dispatch::Consumer);
    }

    #[test]
    fn native_pass_wins_over_inline() {
        let natives = vec![native("alpha", r#"{"a":1}"#, "call_1")];
        let out = detect_calls(
            &natives,
            r#"{"name":"inline","arguments":{}}"#,
            r#"<fc>{"name":"regex","arguments":{}}</fc>"#,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "alpha");
        assert_eq!(out[0].call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn native_batch_preserved() {
        let natives = vec![
            native("alpha", "{}", "call_1"),
            native("beta", "{}", "call_2"),
        ];
        let out = detect_calls(&natives, "", "");
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].name, "beta");
    }

    #[test]
    fn native_malformed_arguments_default_to_empty_object() {
        let natives = vec![native("alpha", "{broken", "call_1")];
        let out = detect_calls(&natives, "", "");
        assert_eq!(out[0].arguments, json!({}));
    }

    #[test]
    fn inline_payload_pass() {
        let out = detect_calls(
            &[],
            r#"{"name":"get_flight_times","arguments":{"departure":"LAX","arrival":"JFK"}}"#,
            "",
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "get_flight_times");
        assert_eq!(out[0].arguments["departure"], "LAX");
        assert!(out[0].call_id.is_none());
    }

    #[test]
    fn fc_regex_pass_over_reply() {
        let out = detect_calls(
            &[],
            "",
            r#"On it. <fc>{"name":"computer","arguments":{"command":"ls"}}</fc>"#,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "computer");
    }

    #[test]
    fn loose_pass_is_last_resort() {
        let out = detect_calls(&[], "", r#"{"name": "t", "arguments": {"q": "x"}}"#);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "t");
    }

    #[test]
    fn invalid_inline_payload_yields_nothing() {
        let out = detect_calls(&[], "{this is not json", "plain text reply");
        assert!(out.is_empty());
    }

    #[test]
    fn vector_filter_arguments_survive_detection() {
        let payload = r#"{"name":"vector_store_search","arguments":{"query":"patches","filters":{"$or":[{"priority":{"$gt":7}},{"category":"emergency"}]}}}"#;
        let out = detect_calls(&[], payload, "");
        assert_eq!(out.len(), 1);
        assert!(out[0].arguments["filters"]["$or"].is_array());
    }
}
