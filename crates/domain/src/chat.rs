use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation roles accepted by the context builder. Anything else in a
/// stored message is normalized to `user` before it reaches a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
    Platform,
}

impl ChatRole {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            "platform" => Self::Platform,
            _ => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Platform => "platform",
        }
    }
}

/// One entry in the message list fed to an upstream provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
        }
    }

    /// Rough token estimate: ~4 bytes per token, minimum 1. Used by the
    /// context-window truncation pass.
    pub fn estimated_tokens(&self) -> usize {
        (self.content.len() / 4).max(1)
    }
}

/// Tool schema exposed to the model (JSON Schema parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A validated tool invocation ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
    /// Provider correlation id for native calls; router-minted otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_roles() {
        assert_eq!(ChatRole::parse("system"), ChatRole::System);
        assert_eq!(ChatRole::parse("ASSISTANT"), ChatRole::Assistant);
        assert_eq!(ChatRole::parse("tool"), ChatRole::Tool);
        assert_eq!(ChatRole::parse("platform"), ChatRole::Platform);
    }

    #[test]
    fn parse_unknown_role_defaults_to_user() {
        assert_eq!(ChatRole::parse("narrator"), ChatRole::User);
        assert_eq!(ChatRole::parse(""), ChatRole::User);
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage::system("s");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
    }

    #[test]
    fn estimated_tokens_floor_of_one() {
        assert_eq!(ChatMessage::user("").estimated_tokens(), 1);
        assert_eq!(ChatMessage::user("abcdefgh").estimated_tokens(), 2);
    }
}
