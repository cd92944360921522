//! The inference orchestration runtime: per-run loop, context builder,
//! tool-call router, platform tool glue, event bus, cancellation, and the
//! action expiry sweeper.
//!
//! Entry point: [`orchestrator::start_run`] drives one run and returns a
//! channel of [`spool_domain::chunk::StreamChunk`]s for SSE delivery.

pub mod calls;
pub mod cancel;
pub mod context;
pub mod events;
pub mod instructions;
pub mod orchestrator;
pub mod platform;
pub mod router;
pub mod sweeper;

pub use orchestrator::{start_run, RunRequest};
