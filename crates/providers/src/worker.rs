//! The provider-worker seam: one implementation per upstream API family.
//! Workers are pure translators — the orchestrator owns tool-call
//! handling, persistence, and cancellation policy.

use std::pin::Pin;

use spool_domain::chat::{ChatMessage, ToolDefinition};
use spool_domain::Result;

use crate::delta::RawDelta;

/// A boxed async stream, used for upstream delta streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// What a worker's upstream family supports.
#[derive(Debug, Clone)]
pub struct WorkerCapabilities {
    /// Structured tool calls on the wire (vs inline `<fc>` markup).
    pub native_tools: bool,
    /// Native `reasoning_content` delta field.
    pub native_reasoning: bool,
    /// Declared context window, tokens.
    pub context_window: usize,
}

/// One upstream completion request, already shaped by the context builder.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Tool schemas; sent natively only when the family supports it.
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Caller-supplied key override. Never shared across runs.
    pub api_key: Option<String>,
}

#[async_trait::async_trait]
pub trait ProviderWorker: Send + Sync {
    /// The model-prefix family this worker serves (e.g. `deepseek-`).
    fn family(&self) -> &str;

    fn capabilities(&self) -> &WorkerCapabilities;

    /// Open the upstream stream. The returned stream yields one delta per
    /// upstream fragment; the consumer checks cancellation between reads
    /// and simply drops the stream to close the connection.
    async fn open_stream(
        &self,
        req: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<RawDelta>>>;
}
