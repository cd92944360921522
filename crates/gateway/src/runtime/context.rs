//! The context builder: assembles the message list fed to an upstream
//! provider from the cached assistant record, the cached thread history,
//! and a freshly-stamped system message, then applies the token-budget
//! truncation pass.
//!
//! Caches are write-through and advisory: the store is authoritative of
//! truth, the cache of recency. Any cache failure falls back to a cold
//! load.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use spool_domain::chat::{ChatMessage, ChatRole, ToolDefinition};
use spool_domain::entity::Assistant;
use spool_domain::Result;
use spool_store::{AssistantRepo, CacheBackend, MessageRepo};

use super::instructions::assemble_instructions;

const ASSISTANT_CACHE_TTL_SECS: u64 = 3600;
const LOCAL_CACHE_TTL: Duration = Duration::from_secs(60);

pub fn assistant_key(id: &str) -> String {
    format!("assistant:{id}")
}

pub fn history_key(thread_id: &str) -> String {
    format!("thread:{thread_id}:history")
}

/// The slice of an Assistant the engine needs per turn, cached in both
/// tiers with the tool catalog pre-serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAssistant {
    pub id: String,
    pub model: String,
    pub instructions: String,
    pub tools_json: String,
    pub tools: Vec<ToolDefinition>,
    pub vector_store_ids: Vec<String>,
    pub web_access: bool,
    pub agent_mode: bool,
    pub deep_research: bool,
    pub decision_telemetry: bool,
}

impl CachedAssistant {
    fn from_assistant(assistant: &Assistant) -> Self {
        let instructions = if assistant.instructions.is_empty() {
            assemble_instructions(&[])
        } else {
            assistant.instructions.clone()
        };
        Self {
            id: assistant.id.clone(),
            model: assistant.model.clone(),
            instructions,
            tools_json: serde_json::to_string(&assistant.tools).unwrap_or_else(|_| "[]".into()),
            tools: assistant.tools.clone(),
            vector_store_ids: assistant
                .vector_store_ids()
                .into_iter()
                .map(String::from)
                .collect(),
            web_access: assistant.web_access,
            agent_mode: assistant.agent_mode,
            deep_research: assistant.deep_research,
            decision_telemetry: assistant.decision_telemetry,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Skip both cache tiers and reload from the store.
    pub force_refresh: bool,
    /// Compose instructions without the inline tool-markup protocol
    /// (models with native tool support are not re-taught `<fc>`).
    pub amended: bool,
}

pub struct ContextBuilder {
    cache: Arc<dyn CacheBackend>,
    assistants: Arc<dyn AssistantRepo>,
    local: Mutex<HashMap<String, (CachedAssistant, Instant)>>,
    history_limit: usize,
    threshold: f64,
}

impl ContextBuilder {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        assistants: Arc<dyn AssistantRepo>,
        history_limit: usize,
        threshold: f64,
    ) -> Self {
        Self {
            cache,
            assistants,
            local: Mutex::new(HashMap::new()),
            history_limit,
            threshold,
        }
    }

    // ── Assistant lookup (local LRU → shared cache → store) ────────

    pub async fn assistant(&self, id: &str, force_refresh: bool) -> Result<CachedAssistant> {
        if !force_refresh {
            if let Some(hit) = self.local_get(id) {
                return Ok(hit);
            }
            if let Ok(Some(raw)) = self.cache.get(&assistant_key(id)).await {
                if let Ok(cached) = serde_json::from_str::<CachedAssistant>(&raw) {
                    self.local_put(cached.clone());
                    return Ok(cached);
                }
            }
        }

        let assistant = self.assistants.get_assistant(id).await?;
        let cached = CachedAssistant::from_assistant(&assistant);

        if let Ok(raw) = serde_json::to_string(&cached) {
            if let Err(e) = self
                .cache
                .set_ex(&assistant_key(id), &raw, ASSISTANT_CACHE_TTL_SECS)
                .await
            {
                tracing::debug!(assistant_id = id, error = %e, "assistant cache write failed");
            }
        }
        self.local_put(cached.clone());
        Ok(cached)
    }

    /// Drop both cache tiers for an assistant (after update/delete).
    pub async fn invalidate_assistant(&self, id: &str) {
        self.local.lock().remove(id);
        let _ = self.cache.del(&assistant_key(id)).await;
    }

    fn local_get(&self, id: &str) -> Option<CachedAssistant> {
        let mut local = self.local.lock();
        match local.get(id) {
            Some((cached, at)) if at.elapsed() < LOCAL_CACHE_TTL => Some(cached.clone()),
            Some(_) => {
                local.remove(id);
                None
            }
            None => None,
        }
    }

    fn local_put(&self, cached: CachedAssistant) {
        self.local.lock().insert(cached.id.clone(), (cached, Instant::now()));
    }

    // ── System message ────────────────────────────────────────────

    pub fn system_message(&self, assistant: &CachedAssistant, amended: bool) -> ChatMessage {
        let instructions = if amended {
            assemble_instructions(&["TOOL_USAGE_PROTOCOL"])
        } else {
            assistant.instructions.clone()
        };
        let today = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        ChatMessage::system(format!(
            "tools:\n{}\n{}\nToday's date and time: {}",
            assistant.tools_json, instructions, today
        ))
    }

    // ── Thread history ────────────────────────────────────────────

    /// Cached history entries for a thread, cold-loading from the store
    /// (trailing `history_limit` messages) on a miss.
    pub async fn history(
        &self,
        messages: &dyn spool_store::MessageRepo,
        thread_id: &str,
    ) -> Vec<ChatMessage> {
        let key = history_key(thread_id);

        let cached = self.cache.lrange_all(&key).await.unwrap_or_default();
        if !cached.is_empty() {
            return cached
                .iter()
                .filter_map(|raw| parse_history_entry(raw))
                .collect();
        }

        // Cold load: store is authoritative; repopulate the cache list.
        let stored = match messages.list_messages(thread_id, self.history_limit).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "history cold load failed");
                return Vec::new();
            }
        };

        let mut history = Vec::with_capacity(stored.len());
        for msg in &stored {
            let entry = json!({"role": msg.role, "content": msg.content}).to_string();
            if let Err(e) = self
                .cache
                .rpush_capped(&key, &entry, self.history_limit)
                .await
            {
                tracing::debug!(thread_id, error = %e, "history cache repopulate failed");
            }
            history.push(ChatMessage {
                role: ChatRole::parse(&msg.role),
                content: msg.content.trim().to_string(),
            });
        }
        history
    }

    /// Write-through append after a message is persisted to the store.
    pub async fn append_history(&self, thread_id: &str, role: &str, content: &str) {
        let entry = json!({"role": role, "content": content}).to_string();
        if let Err(e) = self
            .cache
            .rpush_capped(&history_key(thread_id), &entry, self.history_limit)
            .await
        {
            tracing::debug!(thread_id, error = %e, "history cache append failed");
        }
    }

    pub async fn invalidate_history(&self, thread_id: &str) {
        let _ = self.cache.del(&history_key(thread_id)).await;
    }

    // ── Assembly ──────────────────────────────────────────────────

    /// Build the full message list: system message, normalized history,
    /// token-budget truncation against the model's context window.
    pub async fn build(
        &self,
        messages: &dyn spool_store::MessageRepo,
        assistant_id: &str,
        thread_id: &str,
        context_window: usize,
        opts: BuildOptions,
    ) -> Result<Vec<ChatMessage>> {
        let assistant = self.assistant(assistant_id, opts.force_refresh).await?;
        let system = self.system_message(&assistant, opts.amended);
        let history = self.history(messages, thread_id).await;

        let mut out = Vec::with_capacity(history.len() + 1);
        out.push(system);
        out.extend(history);
        Ok(truncate_to_budget(out, context_window, self.threshold))
    }
}

fn parse_history_entry(raw: &str) -> Option<ChatMessage> {
    let v: serde_json::Value = serde_json::from_str(raw).ok()?;
    let role = v.get("role").and_then(|r| r.as_str()).unwrap_or("user");
    let content = v.get("content").and_then(|c| c.as_str()).unwrap_or("");
    Some(ChatMessage {
        role: ChatRole::parse(role),
        content: content.trim().to_string(),
    })
}

/// Drop oldest non-system messages until the estimated token count fits
/// within `threshold * window`. The system message is never dropped.
pub fn truncate_to_budget(
    messages: Vec<ChatMessage>,
    window: usize,
    threshold: f64,
) -> Vec<ChatMessage> {
    let budget = (window as f64 * threshold) as usize;
    let mut total: usize = messages.iter().map(ChatMessage::estimated_tokens).sum();
    if total <= budget {
        return messages;
    }

    let mut out = messages;
    let mut idx = 0;
    while total > budget && idx < out.len() {
        if out[idx].role == ChatRole::System {
            idx += 1;
            continue;
        }
        total -= out[idx].estimated_tokens();
        out.remove(idx);
    }
    out
}
