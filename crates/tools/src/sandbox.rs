//! Code-interpreter sandbox proxy.
//!
//! The sandbox is a remote service: code goes out, stdout/stderr come back
//! as an HTTP-chunked line stream, and generated files are fetched
//! afterwards as raw bytes (surfaced to clients as base64).

use std::pin::Pin;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use spool_domain::{Error, Result};

pub type LineStream = Pin<Box<dyn futures_core::Stream<Item = Result<String>> + Send + 'static>>;

/// A file produced by a sandbox execution.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxFile {
    pub file_id: String,
    pub filename: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

fn default_mime() -> String {
    "application/octet-stream".into()
}

pub struct SandboxClient {
    base_url: String,
    client: reqwest::Client,
}

impl SandboxClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Submit code for execution; the response body streams output lines
    /// as they are produced.
    pub async fn execute_stream(&self, code: &str, room: &str) -> Result<LineStream> {
        let url = format!("{}/v1/execute", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "code": code, "room": room }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "sandbox execute: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        let stream = async_stream::stream! {
            let mut resp = resp;
            let mut buffer = String::new();
            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let line = line.trim_end_matches('\n').to_string();
                            if !line.is_empty() {
                                yield Ok(line);
                            }
                        }
                    }
                    Ok(None) => {
                        let rest = buffer.trim();
                        if !rest.is_empty() {
                            yield Ok(rest.to_string());
                        }
                        break;
                    }
                    Err(e) => {
                        yield Err(Error::Http(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Files generated during the last execution in `room`.
    pub async fn list_generated_files(&self, room: &str) -> Result<Vec<SandboxFile>> {
        let url = format!("{}/v1/files?room={room}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Http(format!(
                "sandbox files: HTTP {}",
                resp.status().as_u16()
            )));
        }

        #[derive(Deserialize)]
        struct FilesReply {
            #[serde(default)]
            files: Vec<SandboxFile>,
        }
        let reply: FilesReply = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(reply.files)
    }

    /// Fetch a generated file's bytes as base64.
    pub async fn fetch_file_base64(&self, file_id: &str) -> Result<String> {
        let url = format!("{}/v1/files/{file_id}/content", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Http(format!(
                "sandbox file fetch: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let bytes = resp.bytes().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(BASE64.encode(&bytes))
    }
}
