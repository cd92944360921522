//! Persistent entity records and their lifecycle rules.
//!
//! These are the rows the gateway reads and writes through the repository
//! traits; the relational store itself lives behind that seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::chat::ToolDefinition;

/// Mint a prefixed entity id, e.g. `run_5f3a…`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assistant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-tool-type resource attachments, e.g.
/// `{"file_search": {"vector_store_ids": ["vs_1"]}}`.
pub type ToolResources = HashMap<String, ResourceSet>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    #[serde(default)]
    pub vector_store_ids: Vec<String>,
}

/// Immutable during a run; looked up once and cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    pub name: String,
    pub model: String,
    pub instructions: String,
    /// Ordered tool catalog advertised to the model.
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
    pub created_at: DateTime<Utc>,
}

impl Assistant {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: new_id("asst"),
            name: name.into(),
            model: model.into(),
            instructions: String::new(),
            tools: Vec::new(),
            tool_resources: HashMap::new(),
            web_access: false,
            agent_mode: false,
            deep_research: false,
            decision_telemetry: false,
            created_at: Utc::now(),
        }
    }

    /// All vector stores attached for file/vector search.
    pub fn vector_store_ids(&self) -> Vec<&str> {
        self.tool_resources
            .values()
            .flat_map(|set| set.vector_store_ids.iter().map(String::as_str))
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thread & Message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub meta_data: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: new_id("thread"),
            user_id: user_id.into(),
            meta_data: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Set on `role=tool` messages: the Action this output answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        thread_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id("msg"),
            thread_id: thread_id.into(),
            role: role.into(),
            content: content.into(),
            assistant_id: None,
            run_id: None,
            tool_id: None,
            sender_id: sender_id.into(),
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    PendingAction,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed | Self::Expired
        )
    }

    /// The run state machine. Transitions are monotonic except the
    /// `in_progress ⇄ pending_action` resume cycle.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        if self == next {
            return true;
        }
        match self {
            Queued => matches!(next, InProgress | Cancelling | Cancelled | Failed | Expired),
            InProgress => matches!(
                next,
                PendingAction | Cancelling | Cancelled | Completed | Failed | Expired
            ),
            PendingAction => matches!(next, InProgress | Cancelling | Cancelled | Failed | Expired),
            Cancelling => matches!(next, Cancelled | Failed),
            Completed | Cancelled | Failed | Expired => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub user_id: String,
    pub status: RunStatus,
    pub model: String,
    /// Instructions snapshotted at creation; assistant edits mid-run do
    /// not affect an in-flight run.
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Run {
    pub fn new(
        thread_id: impl Into<String>,
        assistant_id: impl Into<String>,
        user_id: impl Into<String>,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id("run"),
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            user_id: user_id.into(),
            status: RunStatus::Queued,
            model: model.into(),
            instructions: instructions.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            failed_at: None,
            error: None,
        }
    }

    /// Apply a status transition, stamping the matching timestamp.
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        match next {
            RunStatus::InProgress if self.started_at.is_none() => self.started_at = Some(now),
            RunStatus::Completed => self.completed_at = Some(now),
            RunStatus::Cancelled => self.cancelled_at = Some(now),
            RunStatus::Failed | RunStatus::Expired => self.failed_at = Some(now),
            _ => {}
        }
        self.status = next;
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

/// One tool invocation tied to a run and a tool-call id. Terminal once
/// `processed_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub run_id: String,
    /// Provider-assigned correlation id; unique within a run.
    pub tool_call_id: String,
    pub tool_name: String,
    /// Loop iteration of the run in which this call was emitted.
    pub turn_index: u32,
    pub status: ActionStatus,
    pub function_args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub triggered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

impl Action {
    pub fn new(
        run_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        turn_index: u32,
        function_args: Value,
        ttl_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("act"),
            run_id: run_id.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            turn_index,
            status: ActionStatus::Pending,
            function_args,
            result: None,
            expires_at: now + chrono::Duration::seconds(ttl_secs),
            triggered_at: now,
            processed_at: None,
            decision_payload: None,
            confidence_score: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending && now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix() {
        assert!(new_id("run").starts_with("run_"));
        assert!(new_id("asst").starts_with("asst_"));
    }

    #[test]
    fn run_happy_path_transitions() {
        let mut run = Run::new("thread_1", "asst_1", "user_1", "deepseek-chat", "");
        assert!(run.transition(RunStatus::InProgress));
        assert!(run.started_at.is_some());
        assert!(run.transition(RunStatus::PendingAction));
        assert!(run.transition(RunStatus::InProgress));
        assert!(run.transition(RunStatus::Completed));
        assert!(run.completed_at.is_some());
        assert!(run.status.is_terminal());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut run = Run::new("t", "a", "u", "m", "");
        run.transition(RunStatus::InProgress);
        run.transition(RunStatus::Completed);
        assert!(!run.transition(RunStatus::InProgress));
        assert!(!run.transition(RunStatus::Failed));
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn queued_cannot_jump_to_completed() {
        let run = Run::new("t", "a", "u", "m", "");
        assert!(!run.status.can_transition_to(RunStatus::Completed));
        assert!(!run.status.can_transition_to(RunStatus::PendingAction));
    }

    #[test]
    fn cancelling_resolves_to_cancelled() {
        let mut run = Run::new("t", "a", "u", "m", "");
        run.transition(RunStatus::InProgress);
        assert!(run.transition(RunStatus::Cancelling));
        assert!(run.transition(RunStatus::Cancelled));
        assert!(run.cancelled_at.is_some());
    }

    #[test]
    fn started_at_not_overwritten_on_resume() {
        let mut run = Run::new("t", "a", "u", "m", "");
        run.transition(RunStatus::InProgress);
        let first = run.started_at;
        run.transition(RunStatus::PendingAction);
        run.transition(RunStatus::InProgress);
        assert_eq!(run.started_at, first);
    }

    #[test]
    fn action_expiry_window() {
        let action = Action::new("run_1", "call_1", "get_weather", 1, serde_json::json!({}), 60);
        assert!(!action.is_expired(Utc::now()));
        assert!(action.is_expired(Utc::now() + chrono::Duration::seconds(120)));
    }

    #[test]
    fn completed_action_never_expires() {
        let mut action = Action::new("run_1", "call_1", "t", 1, serde_json::json!({}), 0);
        action.status = ActionStatus::Completed;
        assert!(!action.is_expired(Utc::now() + chrono::Duration::seconds(120)));
    }

    #[test]
    fn assistant_vector_store_ids_flatten() {
        let mut assistant = Assistant::new("helper", "qwen/qwen-2.5");
        assistant.tool_resources.insert(
            "file_search".into(),
            ResourceSet {
                vector_store_ids: vec!["vs_a".into(), "vs_b".into()],
            },
        );
        let mut ids = assistant.vector_store_ids();
        ids.sort();
        assert_eq!(ids, vec!["vs_a", "vs_b"]);
    }
}
