//! Vector-store search client. Embedding and indexing live in the vector
//! service; the gateway only speaks its search contract and renders hits
//! as tool output.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use spool_domain::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct VectorHit {
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub meta_data: Value,
}

pub struct VectorSearchClient {
    base_url: String,
    client: reqwest::Client,
}

impl VectorSearchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Search one vector store. `filters` is a validated mongo-style
    /// filter document passed through to the service.
    pub async fn search(
        &self,
        store_id: &str,
        query: &str,
        top_k: usize,
        filters: Option<&Value>,
    ) -> Result<Vec<VectorHit>> {
        let url = format!("{}/v1/vector-stores/{store_id}/search", self.base_url);
        let mut body = serde_json::json!({
            "query": query,
            "top_k": top_k,
        });
        if let Some(f) = filters {
            body["filters"] = f.clone();
        }

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "vector search {store_id}: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        #[derive(Deserialize)]
        struct SearchReply {
            #[serde(default)]
            results: Vec<VectorHit>,
        }
        let reply: SearchReply = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(reply.results)
    }
}

/// Render hits from one or more stores as tool output text.
pub fn format_hits(query: &str, hits: &[VectorHit]) -> String {
    if hits.is_empty() {
        return format!("No results for '{query}'.");
    }
    let mut out = vec![format!("Results for '{query}':")];
    for (i, hit) in hits.iter().enumerate() {
        out.push(format!("{}. (score {:.3}) {}", i + 1, hit.score, hit.text));
    }
    out.join("\n")
}
