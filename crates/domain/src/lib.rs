//! Shared domain types for the Spool inference gateway: the error type,
//! configuration, persistent entities, and the stream-chunk vocabulary
//! spoken between the normalizer, the orchestrator, and SSE clients.

pub mod chat;
pub mod chunk;
pub mod config;
pub mod entity;
pub mod error;

pub use error::{Error, Result};
