//! OpenAI-compatible worker adapter.
//!
//! Serves every configured upstream family — DeepSeek, Together,
//! Hyperbolic, Qwen and Meta-Llama hosts all follow the chat-completions
//! wire contract; families differ only in base URL, credentials, and
//! capability flags.

use std::time::Duration;

use serde_json::Value;
use spool_domain::chat::{ChatMessage, ToolDefinition};
use spool_domain::config::ProviderConfig;
use spool_domain::{Error, Result};

use crate::delta::RawDelta;
use crate::sse::sse_response_stream;
use crate::worker::{BoxStream, CompletionRequest, ProviderWorker, WorkerCapabilities};

pub struct OpenAiCompatWorker {
    family: String,
    base_url: String,
    /// Key resolved from the configured env var at construction; a
    /// caller-supplied per-request key always wins.
    default_key: Option<String>,
    capabilities: WorkerCapabilities,
    client: reqwest::Client,
}

impl OpenAiCompatWorker {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let default_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        if default_key.is_none() {
            tracing::warn!(
                family = %cfg.prefix,
                env = %cfg.api_key_env,
                "no default API key in environment; requests must supply one"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            family: cfg.prefix.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            default_key,
            capabilities: WorkerCapabilities {
                native_tools: cfg.native_tools,
                native_reasoning: cfg.native_reasoning,
                context_window: cfg.context_window,
            },
            client,
        })
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
        });

        if self.capabilities.native_tools && !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }

    fn resolve_key<'a>(&'a self, req: &'a CompletionRequest) -> Result<&'a str> {
        req.api_key
            .as_deref()
            .or(self.default_key.as_deref())
            .ok_or_else(|| Error::Auth(format!("no API key available for family {}", self.family)))
    }
}

fn msg_to_wire(msg: &ChatMessage) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// Parse a single SSE `data:` payload. `[DONE]` ends the stream silently
/// (the normalizer's `finish` handles flushing); malformed JSON surfaces
/// as an error delta so the run fails loudly rather than stalling.
fn parse_sse_data(data: &str) -> Vec<Result<RawDelta>> {
    if data.trim() == "[DONE]" {
        return Vec::new();
    }
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };
    match RawDelta::from_sse_json(&v) {
        Some(delta) => vec![Ok(delta)],
        None => Vec::new(),
    }
}

#[async_trait::async_trait]
impl ProviderWorker for OpenAiCompatWorker {
    fn family(&self) -> &str {
        &self.family
    }

    fn capabilities(&self) -> &WorkerCapabilities {
        &self.capabilities
    }

    async fn open_stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<RawDelta>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(req);
        let key = self.resolve_key(req)?;

        tracing::debug!(family = %self.family, model = %req.model, "opening upstream stream");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: self.family.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        Ok(sse_response_stream(resp, parse_sse_data))
    }
}
