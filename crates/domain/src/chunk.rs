use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One streaming event delivered to SSE clients and mirrored into the
/// per-run replay stream. Wire shape:
/// `{"type":"<kind>","content":<str|obj>,"run_id":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamChunk {
    /// Plain assistant text.
    #[serde(rename = "content")]
    Content { content: String, run_id: String },

    /// Chain-of-thought content (`<think>` blocks, reasoning channels,
    /// native `reasoning_content` fields).
    #[serde(rename = "reasoning")]
    Reasoning { content: String, run_id: String },

    /// `<plan>` block content.
    #[serde(rename = "plan")]
    Plan { content: String, run_id: String },

    /// `<decision>` block content.
    #[serde(rename = "decision")]
    Decision { content: String, run_id: String },

    /// Incremental tool-call argument text, streamed as it arrives.
    #[serde(rename = "call_arguments")]
    CallArguments { content: String, run_id: String },

    /// A fully-assembled tool call (name + raw argument JSON).
    #[serde(rename = "tool_call")]
    ToolCall { content: ToolCallPayload, run_id: String },

    /// A line of live output from the code-interpreter sandbox.
    #[serde(rename = "hot_code")]
    HotCode { content: String, run_id: String },

    /// A file generated by the code interpreter, base64-encoded.
    #[serde(rename = "code_interpreter_stream")]
    CodeInterpreterStream { content: GeneratedFile, run_id: String },

    /// Run lifecycle status note.
    #[serde(rename = "status")]
    Status { content: String, run_id: String },

    /// Terminal error frame.
    #[serde(rename = "error")]
    Error { content: String, run_id: String },
}

/// Payload of a `tool_call` chunk. `arguments` is kept as the raw string
/// the model produced — the router owns parse/validation failure handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub name: String,
    pub arguments: String,
    /// Provider-assigned correlation id, when the call came through the
    /// native structured path. Inline-markup calls have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

/// A sandbox-generated file surfaced to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub filename: String,
    pub file_id: String,
    pub base64: String,
    pub mime_type: String,
}

impl StreamChunk {
    pub fn run_id(&self) -> &str {
        match self {
            Self::Content { run_id, .. }
            | Self::Reasoning { run_id, .. }
            | Self::Plan { run_id, .. }
            | Self::Decision { run_id, .. }
            | Self::CallArguments { run_id, .. }
            | Self::ToolCall { run_id, .. }
            | Self::HotCode { run_id, .. }
            | Self::CodeInterpreterStream { run_id, .. }
            | Self::Status { run_id, .. }
            | Self::Error { run_id, .. } => run_id,
        }
    }

    /// Textual content, for chunk kinds that carry plain text.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Content { content, .. }
            | Self::Reasoning { content, .. }
            | Self::Plan { content, .. }
            | Self::Decision { content, .. }
            | Self::CallArguments { content, .. }
            | Self::HotCode { content, .. }
            | Self::Status { content, .. }
            | Self::Error { content, .. } => Some(content),
            Self::ToolCall { .. } | Self::CodeInterpreterStream { .. } => None,
        }
    }

    /// Serialize to the SSE `data:` payload. Falls back to an error frame
    /// if serialization itself fails (pathological, but never panics).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","content":"serialize: {e}","run_id":""}}"#)
        })
    }
}

impl ToolCallPayload {
    /// Parse the accumulated argument text as JSON, if well-formed.
    pub fn arguments_json(&self) -> Option<Value> {
        serde_json::from_str(&self.arguments).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_chunk_wire_shape() {
        let chunk = StreamChunk::Content {
            content: "hello".into(),
            run_id: "run_1".into(),
        };
        let json: Value = serde_json::from_str(&chunk.to_json()).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["run_id"], "run_1");
    }

    #[test]
    fn tool_call_chunk_nested_payload() {
        let chunk = StreamChunk::ToolCall {
            content: ToolCallPayload {
                name: "get_flight_times".into(),
                arguments: r#"{"departure":"LAX","arrival":"JFK"}"#.into(),
                call_id: Some("call_9".into()),
            },
            run_id: "run_2".into(),
        };
        let json: Value = serde_json::from_str(&chunk.to_json()).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["content"]["name"], "get_flight_times");
        assert_eq!(json["content"]["call_id"], "call_9");
    }

    #[test]
    fn round_trip() {
        let chunk = StreamChunk::Reasoning {
            content: "thinking".into(),
            run_id: "run_3".into(),
        };
        let back: StreamChunk = serde_json::from_str(&chunk.to_json()).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn arguments_json_parses_valid() {
        let payload = ToolCallPayload {
            name: "t".into(),
            arguments: r#"{"a":1}"#.into(),
            call_id: None,
        };
        assert_eq!(payload.arguments_json().unwrap()["a"], 1);
    }

    #[test]
    fn arguments_json_none_on_malformed() {
        let payload = ToolCallPayload {
            name: "t".into(),
            arguments: "{broken".into(),
            call_id: None,
        };
        assert!(payload.arguments_json().is_none());
    }
}
