//! The Spool gateway: HTTP/SSE surface plus the inference orchestration
//! runtime (per-run loop, context builder, tool router, event bus).

pub mod api;
pub mod runtime;
pub mod state;
