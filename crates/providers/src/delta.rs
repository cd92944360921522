//! Raw streaming fragments as upstream providers emit them, before
//! normalization. One `RawDelta` corresponds to one SSE `data:` payload.

use serde_json::Value;

/// A fragment of a native structured tool call, keyed by slot index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: u64,
    /// Provider correlation id; present on the first fragment of a slot.
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One upstream delta: plain content, native reasoning, native tool-call
/// fragments, and/or a finish signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDelta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
}

impl RawDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Parse an OpenAI-style streaming chunk (`choices[0].delta`).
    /// Returns `None` for payloads with no usable choice (e.g. usage-only
    /// trailer chunks).
    pub fn from_sse_json(v: &Value) -> Option<RawDelta> {
        let choice = v.get("choices")?.as_array()?.first()?;
        let delta = choice.get("delta").unwrap_or(&Value::Null);

        let mut out = RawDelta {
            finish_reason: choice
                .get("finish_reason")
                .and_then(|f| f.as_str())
                .map(String::from),
            ..Default::default()
        };

        if let Some(text) = delta.get("reasoning_content").and_then(|c| c.as_str()) {
            if !text.is_empty() {
                out.reasoning = Some(text.to_string());
            }
        }

        if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
            if !text.is_empty() {
                out.content = Some(text.to_string());
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for tc in calls {
                let func = tc.get("function").unwrap_or(&Value::Null);
                out.tool_calls.push(ToolCallDelta {
                    index: tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0),
                    id: tc.get("id").and_then(|i| i.as_str()).map(String::from),
                    name: func.get("name").and_then(|n| n.as_str()).map(String::from),
                    arguments: func
                        .get("arguments")
                        .and_then(|a| a.as_str())
                        .map(String::from),
                });
            }
        }

        if out.content.is_none()
            && out.reasoning.is_none()
            && out.tool_calls.is_empty()
            && out.finish_reason.is_none()
        {
            return None;
        }
        Some(out)
    }
}
