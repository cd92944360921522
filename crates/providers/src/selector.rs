//! Worker registry: instantiates one adapter per configured upstream
//! family and selects by model-string prefix (longest match wins).

use std::sync::Arc;

use spool_domain::config::ProviderConfig;
use spool_domain::{Error, Result};

use crate::openai_compat::OpenAiCompatWorker;
use crate::worker::ProviderWorker;

pub struct WorkerRegistry {
    /// (prefix, worker), sorted by descending prefix length.
    workers: Vec<(String, Arc<dyn ProviderWorker>)>,
    init_errors: Vec<WorkerInitError>,
}

/// Records a family that failed to initialize at startup.
#[derive(Debug, Clone)]
pub struct WorkerInitError {
    pub family: String,
    pub error: String,
}

impl WorkerRegistry {
    /// Build the registry from configuration. Families that fail to
    /// initialize are recorded and skipped rather than aborting startup.
    pub fn from_config(configs: &[ProviderConfig]) -> Self {
        let mut workers: Vec<(String, Arc<dyn ProviderWorker>)> = Vec::new();
        let mut init_errors = Vec::new();

        for cfg in configs {
            match OpenAiCompatWorker::from_config(cfg) {
                Ok(worker) => {
                    tracing::info!(family = %cfg.prefix, base_url = %cfg.base_url, "registered provider family");
                    workers.push((cfg.prefix.clone(), Arc::new(worker)));
                }
                Err(e) => {
                    tracing::warn!(family = %cfg.prefix, error = %e, "failed to initialize provider family, skipping");
                    init_errors.push(WorkerInitError {
                        family: cfg.prefix.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        workers.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            workers,
            init_errors,
        }
    }

    /// Select the worker for a model string, e.g. `deepseek-reasoner` or
    /// `qwen/qwen-2.5-72b`.
    pub fn select(&self, model: &str) -> Result<Arc<dyn ProviderWorker>> {
        self.workers
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix.as_str()))
            .map(|(_, worker)| worker.clone())
            .ok_or_else(|| Error::Validation(format!("no provider family for model '{model}'")))
    }

    /// Declared context window for a model (128k default when unknown).
    pub fn context_window(&self, model: &str) -> usize {
        self.select(model)
            .map(|w| w.capabilities().context_window)
            .unwrap_or(128_000)
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn init_errors(&self) -> &[WorkerInitError] {
        &self.init_errors
    }
}
