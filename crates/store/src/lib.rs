//! Storage seams for the gateway: the shared cache backend (Redis or
//! in-memory), repository traits with an in-memory implementation, and
//! the API-key service.

pub mod cache;
pub mod keys;
pub mod redis_cache;
pub mod repo;

pub use cache::{CacheBackend, MemoryCache};
pub use keys::{ApiKeyRecord, ApiKeyService};
pub use redis_cache::RedisCache;
pub use repo::{ActionRepo, AssistantRepo, MemoryStore, MessageRepo, RunRepo, ThreadRepo};
