//! Shared application state passed to all API handlers and the runtime.

use std::sync::Arc;

use spool_domain::config::Config;
use spool_domain::Result;
use spool_providers::{ProviderWorker, WorkerRegistry};
use spool_store::{
    ActionRepo, ApiKeyService, AssistantRepo, CacheBackend, MemoryCache, MemoryStore, MessageRepo,
    RedisCache, RunRepo, ThreadRepo,
};

use crate::runtime::cancel::CancelMap;
use crate::runtime::context::ContextBuilder;
use crate::runtime::events::EventBus;
use crate::runtime::platform::PlatformTools;
use crate::runtime::router::ToolRouter;

/// The worker-selection seam: production uses [`WorkerRegistry`]; tests
/// install scripted workers.
pub trait WorkerSource: Send + Sync {
    fn select(&self, model: &str) -> Result<Arc<dyn ProviderWorker>>;
}

impl WorkerSource for WorkerRegistry {
    fn select(&self, model: &str) -> Result<Arc<dyn ProviderWorker>> {
        WorkerRegistry::select(self, model)
    }
}

/// Shared application state. Fields are grouped by concern:
/// - **config & cache** — runtime config, the shared cache backend
/// - **repositories** — the persistent-store seams
/// - **engine** — workers, context builder, tool router, event bus,
///   cancellation
/// - **auth** — API-key service
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<dyn CacheBackend>,

    pub assistants: Arc<dyn AssistantRepo>,
    pub threads: Arc<dyn ThreadRepo>,
    pub messages: Arc<dyn MessageRepo>,
    pub runs: Arc<dyn RunRepo>,
    pub actions: Arc<dyn ActionRepo>,

    pub workers: Arc<dyn WorkerSource>,
    pub context: Arc<ContextBuilder>,
    pub router: Arc<ToolRouter>,
    pub events: Arc<EventBus>,
    pub cancel_map: Arc<CancelMap>,

    pub api_keys: Arc<ApiKeyService>,
}

/// Build production state: Redis when configured (falling back to the
/// in-memory backend on connection failure — caches are advisory), the
/// in-memory store, and the configured provider registry.
pub async fn build_state(config: Config) -> Result<AppState> {
    let cache: Arc<dyn CacheBackend> = match &config.cache.url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(redis) => {
                tracing::info!(url, "connected to shared cache");
                Arc::new(redis)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "cache unavailable; using in-memory backend");
                Arc::new(MemoryCache::new())
            }
        },
        None => Arc::new(MemoryCache::new()),
    };

    let store = Arc::new(MemoryStore::new());
    let workers = Arc::new(WorkerRegistry::from_config(&config.providers));
    assemble_state(config, cache, store, workers)
}

/// Wire the state graph from its roots. Tests call this with an
/// in-memory cache and scripted workers.
pub fn assemble_state(
    config: Config,
    cache: Arc<dyn CacheBackend>,
    store: Arc<MemoryStore>,
    workers: Arc<dyn WorkerSource>,
) -> Result<AppState> {
    let config = Arc::new(config);

    let assistants: Arc<dyn AssistantRepo> = store.clone();
    let threads: Arc<dyn ThreadRepo> = store.clone();
    let messages: Arc<dyn MessageRepo> = store.clone();
    let runs: Arc<dyn RunRepo> = store.clone();
    let actions: Arc<dyn ActionRepo> = store.clone();

    let context = Arc::new(ContextBuilder::new(
        cache.clone(),
        assistants.clone(),
        config.cache.history_limit,
        config.engine.context_threshold,
    ));

    let platform = Arc::new(PlatformTools::new(&config, cache.clone())?);

    let router = Arc::new(ToolRouter::new(
        actions.clone(),
        runs.clone(),
        messages.clone(),
        context.clone(),
        platform,
        config.engine.action_timeout_secs,
    ));

    let events = Arc::new(EventBus::new(
        cache.clone(),
        config.cache.stream_max_entries,
        config.cache.stream_ttl_secs,
    ));

    Ok(AppState {
        config,
        cache,
        assistants,
        threads,
        messages,
        runs,
        actions,
        workers,
        context,
        router,
        events,
        cancel_map: Arc::new(CancelMap::new()),
        api_keys: Arc::new(ApiKeyService::new()),
    })
}
