//! Repository traits over the persistent store, plus the in-memory
//! implementation the gateway ships with. A relational backend slots in
//! behind the same traits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use spool_domain::entity::{Action, ActionStatus, Assistant, Message, Run, RunStatus, Thread};
use spool_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait AssistantRepo: Send + Sync {
    async fn create_assistant(&self, assistant: Assistant) -> Result<Assistant>;
    async fn get_assistant(&self, id: &str) -> Result<Assistant>;
    async fn update_assistant(&self, assistant: Assistant) -> Result<Assistant>;
    async fn delete_assistant(&self, id: &str) -> Result<()>;
    async fn list_assistants(&self) -> Result<Vec<Assistant>>;
}

#[async_trait::async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn create_thread(&self, thread: Thread) -> Result<Thread>;
    async fn get_thread(&self, id: &str) -> Result<Thread>;
    /// Deleting a thread cascades to its messages; the caller is
    /// responsible for invalidating the thread-history cache.
    async fn delete_thread(&self, id: &str) -> Result<()>;
    async fn list_threads(&self, user_id: &str) -> Result<Vec<Thread>>;
}

#[async_trait::async_trait]
pub trait MessageRepo: Send + Sync {
    async fn append_message(&self, message: Message) -> Result<Message>;
    async fn get_message(&self, id: &str) -> Result<Message>;
    /// Trailing `limit` messages of a thread, ordered by `created_at`.
    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<Message>>;
}

#[async_trait::async_trait]
pub trait RunRepo: Send + Sync {
    async fn create_run(&self, run: Run) -> Result<Run>;
    async fn get_run(&self, id: &str) -> Result<Run>;
    /// Apply a status transition. Invalid transitions are rejected with a
    /// `Validation` error and leave the run untouched.
    async fn update_run_status(&self, id: &str, next: RunStatus) -> Result<Run>;
    async fn set_run_error(&self, id: &str, error: &str) -> Result<()>;
    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>>;
}

#[async_trait::async_trait]
pub trait ActionRepo: Send + Sync {
    /// Persist a new Action. `tool_call_id` must be unique within the run.
    async fn create_action(&self, action: Action) -> Result<Action>;
    async fn get_action(&self, id: &str) -> Result<Action>;
    async fn update_action_status(&self, id: &str, status: ActionStatus) -> Result<Action>;
    /// Record the tool result and mark the Action terminal. A no-op when
    /// the Action is already terminal (idempotent re-submission).
    async fn complete_action(&self, id: &str, result: &str, status: ActionStatus)
        -> Result<Action>;
    async fn pending_actions(&self, run_id: &str) -> Result<Vec<Action>>;
    /// Every action of a run, ordered by trigger time.
    async fn list_actions(&self, run_id: &str) -> Result<Vec<Action>>;
    /// All pending actions past their deadline, across runs.
    async fn expired_actions(&self, now: DateTime<Utc>) -> Result<Vec<Action>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct StoreInner {
    assistants: HashMap<String, Assistant>,
    threads: HashMap<String, Thread>,
    /// thread_id → ordered messages.
    messages: HashMap<String, Vec<Message>>,
    message_index: HashMap<String, String>, // message_id → thread_id
    runs: HashMap<String, Run>,
    actions: HashMap<String, Action>,
}

/// Single-process store backing dev deployments and the test suite.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AssistantRepo for MemoryStore {
    async fn create_assistant(&self, assistant: Assistant) -> Result<Assistant> {
        self.inner
            .write()
            .assistants
            .insert(assistant.id.clone(), assistant.clone());
        Ok(assistant)
    }

    async fn get_assistant(&self, id: &str) -> Result<Assistant> {
        self.inner
            .read()
            .assistants
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("assistant {id}")))
    }

    async fn update_assistant(&self, assistant: Assistant) -> Result<Assistant> {
        let mut inner = self.inner.write();
        if !inner.assistants.contains_key(&assistant.id) {
            return Err(Error::NotFound(format!("assistant {}", assistant.id)));
        }
        inner
            .assistants
            .insert(assistant.id.clone(), assistant.clone());
        Ok(assistant)
    }

    async fn delete_assistant(&self, id: &str) -> Result<()> {
        self.inner
            .write()
            .assistants
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("assistant {id}")))
    }

    async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        let mut all: Vec<_> = self.inner.read().assistants.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[async_trait::async_trait]
impl ThreadRepo for MemoryStore {
    async fn create_thread(&self, thread: Thread) -> Result<Thread> {
        self.inner
            .write()
            .threads
            .insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, id: &str) -> Result<Thread> {
        self.inner
            .read()
            .threads
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("thread {id}")))
    }

    async fn delete_thread(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .threads
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("thread {id}")))?;
        if let Some(messages) = inner.messages.remove(id) {
            for m in messages {
                inner.message_index.remove(&m.id);
            }
        }
        Ok(())
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<Thread>> {
        let mut all: Vec<_> = self
            .inner
            .read()
            .threads
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[async_trait::async_trait]
impl MessageRepo for MemoryStore {
    async fn append_message(&self, message: Message) -> Result<Message> {
        let mut inner = self.inner.write();
        if !inner.threads.contains_key(&message.thread_id) {
            return Err(Error::NotFound(format!("thread {}", message.thread_id)));
        }
        inner
            .message_index
            .insert(message.id.clone(), message.thread_id.clone());
        inner
            .messages
            .entry(message.thread_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let inner = self.inner.read();
        let thread_id = inner
            .message_index
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;
        inner
            .messages
            .get(thread_id)
            .and_then(|list| list.iter().find(|m| m.id == id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("message {id}")))
    }

    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<Message>> {
        let inner = self.inner.read();
        let list = inner.messages.get(thread_id).cloned().unwrap_or_default();
        let skip = list.len().saturating_sub(limit);
        Ok(list.into_iter().skip(skip).collect())
    }
}

#[async_trait::async_trait]
impl RunRepo for MemoryStore {
    async fn create_run(&self, run: Run) -> Result<Run> {
        self.inner.write().runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: &str) -> Result<Run> {
        self.inner
            .read()
            .runs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("run {id}")))
    }

    async fn update_run_status(&self, id: &str, next: RunStatus) -> Result<Run> {
        let mut inner = self.inner.write();
        let run = inner
            .runs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("run {id}")))?;
        if !run.transition(next) {
            return Err(Error::Validation(format!(
                "run {id}: illegal transition {:?} -> {:?}",
                run.status, next
            )));
        }
        Ok(run.clone())
    }

    async fn set_run_error(&self, id: &str, error: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let run = inner
            .runs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("run {id}")))?;
        run.error = Some(error.to_string());
        Ok(())
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>> {
        let mut all: Vec<_> = self
            .inner
            .read()
            .runs
            .values()
            .filter(|r| r.thread_id == thread_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[async_trait::async_trait]
impl ActionRepo for MemoryStore {
    async fn create_action(&self, action: Action) -> Result<Action> {
        let mut inner = self.inner.write();
        let duplicate = inner
            .actions
            .values()
            .any(|a| a.run_id == action.run_id && a.tool_call_id == action.tool_call_id);
        if duplicate {
            return Err(Error::Validation(format!(
                "duplicate tool_call_id {} in run {}",
                action.tool_call_id, action.run_id
            )));
        }
        inner.actions.insert(action.id.clone(), action.clone());
        Ok(action)
    }

    async fn get_action(&self, id: &str) -> Result<Action> {
        self.inner
            .read()
            .actions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("action {id}")))
    }

    async fn update_action_status(&self, id: &str, status: ActionStatus) -> Result<Action> {
        let mut inner = self.inner.write();
        let action = inner
            .actions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("action {id}")))?;
        action.status = status;
        Ok(action.clone())
    }

    async fn complete_action(
        &self,
        id: &str,
        result: &str,
        status: ActionStatus,
    ) -> Result<Action> {
        let mut inner = self.inner.write();
        let action = inner
            .actions
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("action {id}")))?;
        if action.processed_at.is_some() {
            // Already terminal — re-submission is a no-op.
            return Ok(action.clone());
        }
        action.result = Some(result.to_string());
        action.status = status;
        action.processed_at = Some(Utc::now());
        Ok(action.clone())
    }

    async fn pending_actions(&self, run_id: &str) -> Result<Vec<Action>> {
        let mut pending: Vec<_> = self
            .inner
            .read()
            .actions
            .values()
            .filter(|a| a.run_id == run_id && a.status == ActionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.triggered_at.cmp(&b.triggered_at));
        Ok(pending)
    }

    async fn list_actions(&self, run_id: &str) -> Result<Vec<Action>> {
        let mut all: Vec<_> = self
            .inner
            .read()
            .actions
            .values()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.triggered_at.cmp(&b.triggered_at));
        Ok(all)
    }

    async fn expired_actions(&self, now: DateTime<Utc>) -> Result<Vec<Action>> {
        Ok(self
            .inner
            .read()
            .actions
            .values()
            .filter(|a| a.is_expired(now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[tokio::test]
    async fn assistant_crud() {
        let s = store();
        let a = s
            .create_assistant(Assistant::new("helper", "deepseek-chat"))
            .await
            .unwrap();
        assert_eq!(s.get_assistant(&a.id).await.unwrap().name, "helper");

        let mut edited = a.clone();
        edited.instructions = "be brief".into();
        s.update_assistant(edited).await.unwrap();
        assert_eq!(
            s.get_assistant(&a.id).await.unwrap().instructions,
            "be brief"
        );

        s.delete_assistant(&a.id).await.unwrap();
        assert!(s.get_assistant(&a.id).await.is_err());
    }

    #[tokio::test]
    async fn thread_delete_cascades_messages() {
        let s = store();
        let t = s.create_thread(Thread::new("user_1")).await.unwrap();
        let m = s
            .append_message(Message::new(&t.id, "user", "hi", "user_1"))
            .await
            .unwrap();
        s.delete_thread(&t.id).await.unwrap();
        assert!(s.get_message(&m.id).await.is_err());
        assert!(s.list_messages(&t.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_trailing_limit() {
        let s = store();
        let t = s.create_thread(Thread::new("user_1")).await.unwrap();
        for i in 0..10 {
            s.append_message(Message::new(&t.id, "user", format!("m{i}"), "user_1"))
                .await
                .unwrap();
        }
        let tail = s.list_messages(&t.id, 3).await.unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].content, "m7");
        assert_eq!(tail[2].content, "m9");
    }

    #[tokio::test]
    async fn message_to_missing_thread_rejected() {
        let s = store();
        let err = s
            .append_message(Message::new("thread_missing", "user", "hi", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn run_status_machine_enforced() {
        let s = store();
        let run = s
            .create_run(Run::new("t", "a", "u", "deepseek-chat", ""))
            .await
            .unwrap();
        s.update_run_status(&run.id, RunStatus::InProgress)
            .await
            .unwrap();
        // queued → completed would have been illegal; in_progress → completed is fine.
        s.update_run_status(&run.id, RunStatus::Completed)
            .await
            .unwrap();
        let err = s
            .update_run_status(&run.id, RunStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_tool_call_id_rejected() {
        let s = store();
        s.create_action(Action::new("run_1", "call_1", "t", 1, json!({}), 60))
            .await
            .unwrap();
        let err = s
            .create_action(Action::new("run_1", "call_1", "t", 2, json!({}), 60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // Same call id in a different run is fine.
        s.create_action(Action::new("run_2", "call_1", "t", 1, json!({}), 60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn complete_action_is_idempotent() {
        let s = store();
        let a = s
            .create_action(Action::new("run_1", "call_1", "t", 1, json!({}), 60))
            .await
            .unwrap();
        let first = s
            .complete_action(&a.id, "4h30m", ActionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(first.result.as_deref(), Some("4h30m"));

        // Re-submission must not overwrite the stored result.
        let second = s
            .complete_action(&a.id, "other", ActionStatus::Failed)
            .await
            .unwrap();
        assert_eq!(second.result.as_deref(), Some("4h30m"));
        assert_eq!(second.status, ActionStatus::Completed);
    }

    #[tokio::test]
    async fn expired_actions_sweep_scope() {
        let s = store();
        let stale = s
            .create_action(Action::new("run_1", "call_1", "t", 1, json!({}), 0))
            .await
            .unwrap();
        s.create_action(Action::new("run_1", "call_2", "t", 1, json!({}), 3600))
            .await
            .unwrap();
        let later = Utc::now() + chrono::Duration::seconds(5);
        let expired = s.expired_actions(later).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
    }

    #[tokio::test]
    async fn pending_actions_ordered_by_trigger_time() {
        let s = store();
        let first = s
            .create_action(Action::new("run_1", "call_a", "t", 1, json!({}), 60))
            .await
            .unwrap();
        let second = s
            .create_action(Action::new("run_1", "call_b", "t", 1, json!({}), 60))
            .await
            .unwrap();
        let pending = s.pending_actions("run_1").await.unwrap();
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
    }
}
