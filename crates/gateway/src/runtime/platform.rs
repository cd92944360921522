//! Platform-native tool execution: the in-process side of the dispatch
//! table. Every handler catches its own failures and reports them through
//! the structured error payload — nothing propagates out of a tool call.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use spool_domain::chunk::{GeneratedFile, StreamChunk};
use spool_domain::config::Config;
use spool_domain::{Error, Result};
use spool_store::CacheBackend;
use spool_tools::{vector, SandboxClient, ShellClient, VectorSearchClient, WebReader};

use super::context::CachedAssistant;
use super::events::Emitter;

/// Tools the gateway executes itself; everything else is surfaced to the
/// consumer.
pub const PLATFORM_TOOLS: &[&str] = &[
    "code_interpreter",
    "computer",
    "file_search",
    "vector_store_search",
    "web_search",
    "web_read",
    "web_scroll",
];

pub fn is_platform_tool(name: &str) -> bool {
    PLATFORM_TOOLS.contains(&name)
}

/// The result a handler submits as the Action output.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }
}

/// Per-call context handed to handlers.
pub struct ExecutionContext<'a> {
    pub run_id: &'a str,
    pub thread_id: &'a str,
    pub assistant: &'a CachedAssistant,
    pub emitter: &'a Emitter,
}

/// User-visible error payload shape.
pub fn error_payload(error: &Error, surface_traceback: bool) -> String {
    let error_type = match error {
        Error::Http(_) => "HttpError",
        Error::Timeout(_) => "TimeoutError",
        Error::Json(_) => "JsonError",
        Error::Validation(_) => "ValidationError",
        Error::NotFound(_) => "NotFoundError",
        Error::Provider { .. } => "ProviderError",
        Error::Cache(_) => "CacheError",
        Error::Store(_) => "StoreError",
        _ => "ToolError",
    };
    let mut payload = json!({
        "error_type": error_type,
        "message": error.to_string(),
    });
    if surface_traceback {
        payload["traceback"] = json!(format!("{error:?}"));
    }
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| error.to_string())
}

pub struct PlatformTools {
    web: WebReader,
    sandbox: SandboxClient,
    shell: ShellClient,
    vector: VectorSearchClient,
    surface_traceback: bool,
}

impl PlatformTools {
    pub fn new(config: &Config, cache: Arc<dyn CacheBackend>) -> Result<Self> {
        Ok(Self {
            web: WebReader::new(cache, config.cache.web_ttl_secs)?,
            sandbox: SandboxClient::new(&config.workers.sandbox_url)?,
            shell: ShellClient::new(&config.workers.shell_ws_url),
            vector: VectorSearchClient::new(&config.workers.vector_url)?,
            surface_traceback: config.engine.surface_traceback,
        })
    }

    /// Run one platform tool. Never returns `Err` — failures become an
    /// error outcome the model can read and recover from.
    pub async fn execute(
        &self,
        name: &str,
        args: &Value,
        ctx: &ExecutionContext<'_>,
    ) -> ToolOutcome {
        let result = match name {
            "code_interpreter" => self.run_code_interpreter(args, ctx).await,
            "computer" => self.run_shell(args, ctx).await,
            "file_search" | "vector_store_search" => self.run_vector_search(args, ctx).await,
            "web_read" => self.run_web_read(args).await,
            "web_scroll" => self.run_web_scroll(args).await,
            "web_search" => self.run_web_search(args).await,
            other => Err(Error::Validation(format!("unknown platform tool '{other}'"))),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(tool = name, run_id = ctx.run_id, error = %e, "platform tool failed");
                ToolOutcome {
                    content: error_payload(&e, self.surface_traceback),
                    is_error: true,
                }
            }
        }
    }

    // ── code_interpreter ──────────────────────────────────────────

    async fn run_code_interpreter(
        &self,
        args: &Value,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ToolOutcome> {
        let code = require_str(args, "code")?;

        ctx.emitter
            .emit(StreamChunk::HotCode {
                content: format!("```python\n{code}\n```\n"),
                run_id: ctx.run_id.to_string(),
            })
            .await;

        let mut stream = self.sandbox.execute_stream(code, ctx.thread_id).await?;
        let mut output = String::new();
        while let Some(line) = stream.next().await {
            let line = line?;
            ctx.emitter
                .emit(StreamChunk::HotCode {
                    content: format!("{line}\n"),
                    run_id: ctx.run_id.to_string(),
                })
                .await;
            output.push_str(&line);
            output.push('\n');
        }

        // Generated files are surfaced as base64 chunks; a fetch failure
        // degrades to a note in the text summary.
        match self.sandbox.list_generated_files(ctx.thread_id).await {
            Ok(files) => {
                for file in files {
                    match self.sandbox.fetch_file_base64(&file.file_id).await {
                        Ok(base64) => {
                            ctx.emitter
                                .emit(StreamChunk::CodeInterpreterStream {
                                    content: GeneratedFile {
                                        filename: file.filename.clone(),
                                        file_id: file.file_id.clone(),
                                        base64,
                                        mime_type: file.mime_type.clone(),
                                    },
                                    run_id: ctx.run_id.to_string(),
                                })
                                .await;
                        }
                        Err(e) => {
                            output.push_str(&format!(
                                "[file '{}' could not be retrieved: {e}]\n",
                                file.filename
                            ));
                        }
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "sandbox file listing failed"),
        }

        Ok(ToolOutcome::ok(output))
    }

    // ── computer (remote shell) ───────────────────────────────────

    async fn run_shell(&self, args: &Value, ctx: &ExecutionContext<'_>) -> Result<ToolOutcome> {
        let commands: Vec<String> = match args.get("commands") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![require_str(args, "command")?.to_string()],
        };
        if commands.is_empty() {
            return Err(Error::Validation("no commands supplied".into()));
        }
        let elevated = args.get("elevated").and_then(Value::as_bool).unwrap_or(false);

        let transcript = self
            .shell
            .run_commands(
                ctx.thread_id,
                &commands,
                elevated,
                Duration::from_secs(2),
            )
            .await?;
        Ok(ToolOutcome::ok(transcript))
    }

    // ── file_search / vector_store_search ─────────────────────────

    async fn run_vector_search(
        &self,
        args: &Value,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ToolOutcome> {
        let query = require_str(args, "query")?;
        let top_k = args.get("top_k").and_then(Value::as_u64).unwrap_or(5) as usize;
        let filters = args.get("filters");

        let store_ids = &ctx.assistant.vector_store_ids;
        if store_ids.is_empty() {
            return Err(Error::Validation(format!(
                "assistant {} has no vector stores attached",
                ctx.assistant.id
            )));
        }

        let mut hits = Vec::new();
        for store_id in store_ids {
            match self.vector.search(store_id, query, top_k, filters).await {
                Ok(mut found) => hits.append(&mut found),
                Err(e) => {
                    tracing::warn!(store_id, error = %e, "vector store search failed");
                }
            }
        }
        Ok(ToolOutcome::ok(vector::format_hits(query, &hits)))
    }

    // ── web tools ─────────────────────────────────────────────────

    async fn run_web_read(&self, args: &Value) -> Result<ToolOutcome> {
        let url = require_str(args, "url")?;
        let force_refresh = args
            .get("force_refresh")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(ToolOutcome::ok(self.web.read(url, force_refresh).await))
    }

    async fn run_web_scroll(&self, args: &Value) -> Result<ToolOutcome> {
        let url = require_str(args, "url")?;
        let page = args.get("page").and_then(Value::as_u64).unwrap_or(0) as usize;
        Ok(ToolOutcome::ok(self.web.scroll(url, page).await))
    }

    /// `web_search(url, query)` scans an opened page; with only a query
    /// it is the SERP entry point.
    async fn run_web_search(&self, args: &Value) -> Result<ToolOutcome> {
        let query = require_str(args, "query")?;
        match args.get("url").and_then(Value::as_str) {
            Some(url) => Ok(ToolOutcome::ok(self.web.search(url, query).await)),
            None => Ok(ToolOutcome::ok(self.web.serp_search(query).await)),
        }
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation(format!("missing required argument: {key}")))
}
