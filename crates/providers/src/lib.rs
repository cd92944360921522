//! Upstream provider plumbing: raw delta types, SSE stream handling, the
//! delta normalizer, the OpenAI-compatible worker adapter, and the
//! prefix-keyed worker registry.

pub mod delta;
pub mod normalizer;
pub mod openai_compat;
pub mod selector;
pub mod sse;
pub mod worker;

pub use delta::{RawDelta, ToolCallDelta};
pub use normalizer::Normalizer;
pub use openai_compat::OpenAiCompatWorker;
pub use selector::WorkerRegistry;
pub use worker::{BoxStream, CompletionRequest, ProviderWorker, WorkerCapabilities};
