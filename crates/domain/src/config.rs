//! Gateway configuration, loaded from TOML with serde defaults so a
//! minimal file (or none at all) still yields a runnable dev config.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
    pub auth: AuthConfig,
    pub providers: Vec<ProviderConfig>,
    pub workers: WorkerEndpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis URL. `None` runs the gateway on the in-memory backend
    /// (single-process; cancellation flags do not survive restarts).
    pub url: Option<String>,
    /// TTL for cached web sessions.
    pub web_ttl_secs: u64,
    /// TTL for mirrored run event streams.
    pub stream_ttl_secs: u64,
    /// Cap on mirrored events per run.
    pub stream_max_entries: usize,
    /// Cap on cached thread-history entries.
    pub history_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            web_ttl_secs: 3600,
            stream_ttl_secs: 3600,
            stream_max_entries: 1000,
            history_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on model turns per run.
    pub max_turns: u32,
    /// Fraction of the model context window usable by history.
    pub context_threshold: f64,
    /// Seconds a consumer-side Action may stay pending.
    pub action_timeout_secs: i64,
    /// Interval of the Action expiry sweeper.
    pub sweep_interval_secs: u64,
    /// Cancellation flag poll interval, milliseconds.
    pub cancel_poll_ms: u64,
    /// Include tracebacks in tool error payloads.
    pub surface_traceback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            context_threshold: 0.8,
            action_timeout_secs: 60,
            sweep_interval_secs: 15,
            cancel_poll_ms: 100,
            surface_traceback: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When false, requests without an `X-API-Key` header are admitted as
    /// an anonymous dev user.
    pub require_api_key: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_api_key: true,
        }
    }
}

/// One upstream provider family, matched by model-string prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model prefix this family claims, e.g. `deepseek-` or `qwen/`.
    pub prefix: String,
    pub base_url: String,
    /// Environment variable holding the default API key.
    pub api_key_env: String,
    /// Family supports native structured tool calls.
    #[serde(default)]
    pub native_tools: bool,
    /// Family emits a native `reasoning_content` delta field.
    #[serde(default)]
    pub native_reasoning: bool,
    /// Declared context window for models of this family, tokens.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

fn default_context_window() -> usize {
    128_000
}

/// External worker endpoints the platform tools call out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerEndpoints {
    /// Code-interpreter sandbox base URL.
    pub sandbox_url: String,
    /// Shell worker WebSocket URL.
    pub shell_ws_url: String,
    /// Vector-store search service base URL.
    pub vector_url: String,
}

impl Default for WorkerEndpoints {
    fn default() -> Self {
        Self {
            sandbox_url: "http://localhost:8000".into(),
            shell_ws_url: "ws://localhost:8500/ws".into(),
            vector_url: "http://localhost:8100".into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.providers.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "no providers configured; every run will fail provider selection".into(),
            });
        }
        for pc in &self.providers {
            if pc.prefix.is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    message: format!("provider with base_url {} has an empty prefix", pc.base_url),
                });
            }
            if pc.base_url.is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    message: format!("provider {} has an empty base_url", pc.prefix),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.engine.context_threshold) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: format!(
                    "engine.context_threshold must be in [0,1], got {}",
                    self.engine.context_threshold
                ),
            });
        }
        if self.engine.max_turns == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "engine.max_turns must be at least 1".into(),
            });
        }
        if self.cache.url.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "cache.url not set; using the in-memory backend".into(),
            });
        }

        issues
    }
}
