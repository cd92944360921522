//! Paged storage for scraped web content.
//!
//! A fetched page is split into ~4 KB chunks ("pages") so the agent can
//! scroll instead of swallowing whole documents, and searched server-side
//! so only matching context windows reach the model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spool_domain::Result;
use spool_store::CacheBackend;
use std::sync::Arc;

pub const CHUNK_SIZE: usize = 4000;
const MAX_SEARCH_HITS: usize = 15;
const SNIPPET_WINDOW: usize = 150;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSession {
    pub url: String,
    pub source: String,
    pub total_pages: usize,
    pub chunks: Vec<String>,
    pub full_length: usize,
    pub fetched_at: i64,
}

pub struct WebSessionCache {
    cache: Arc<dyn CacheBackend>,
    ttl_secs: u64,
}

fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("web_session:{}", hex::encode(digest))
}

/// Split text into fixed-size pages on char boundaries.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::with_capacity(CHUNK_SIZE);
    for ch in text.chars() {
        current.push(ch);
        if current.len() >= CHUNK_SIZE {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

impl WebSessionCache {
    pub fn new(cache: Arc<dyn CacheBackend>, ttl_secs: u64) -> Self {
        Self { cache, ttl_secs }
    }

    pub async fn get_session(&self, url: &str) -> Option<WebSession> {
        let raw = self.cache.get(&cache_key(url)).await.ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn save_session(&self, url: &str, full_text: &str, source: &str) -> Result<()> {
        let chunks = chunk_text(full_text);
        let session = WebSession {
            url: url.to_string(),
            source: source.to_string(),
            total_pages: chunks.len(),
            full_length: full_text.len(),
            chunks,
            fetched_at: chrono::Utc::now().timestamp(),
        };
        let payload = serde_json::to_string(&session)?;
        self.cache
            .set_ex(&cache_key(url), &payload, self.ttl_secs)
            .await
    }

    /// Render one page for the model, with scroll hints.
    pub async fn page_view(&self, url: &str, page_index: usize) -> String {
        let Some(session) = self.get_session(url).await else {
            return "Error: cache miss. This URL has not been loaded yet; call `web_read` first."
                .to_string();
        };
        render_page(&session, page_index)
    }

    /// Scan all cached pages for a query, returning trimmed context
    /// windows rather than full pages.
    pub async fn search_session(&self, url: &str, query: &str) -> String {
        let Some(session) = self.get_session(url).await else {
            return "Error: cache miss. This URL has not been loaded yet; call `web_read` first."
                .to_string();
        };

        let query_lower = query.to_lowercase();
        let mut results = Vec::new();

        for (index, chunk) in session.chunks.iter().enumerate() {
            let chunk_lower = chunk.to_lowercase();
            if let Some(start) = chunk_lower.find(&query_lower) {
                let snippet = snippet_around(chunk, start, query.len());
                results.push(format!("--- FOUND IN PAGE {index} ---\n...{snippet}..."));
                if results.len() >= MAX_SEARCH_HITS {
                    break;
                }
            }
        }

        if results.is_empty() {
            return format!(
                "Keyword '{query}' not found in any of the {} pages.",
                session.chunks.len()
            );
        }

        let mut output = vec![format!(
            "--- SEARCH RESULTS: '{query}' in {} ---",
            session.url
        )];
        let truncated = results.len() >= MAX_SEARCH_HITS;
        output.extend(results);
        if truncated {
            output.push("(Search limit reached. There may be more matches.)".to_string());
        }
        output.push(
            "SYSTEM HINT: use `web_scroll(url, page=X)` to read the full context of a page."
                .to_string(),
        );
        output.join("\n")
    }
}

fn render_page(session: &WebSession, page_index: usize) -> String {
    let total = session.total_pages;
    if page_index >= total {
        return format!(
            "Error: page {page_index} out of bounds. Total pages: {total}. (Try page {})",
            total.saturating_sub(1)
        );
    }

    let mut output = vec![
        format!("--- WEB BROWSER: {} ---", session.url),
        format!(
            "--- SOURCE: {} | VIEW: Page {page_index} of {} ---",
            session.source,
            total - 1
        ),
        format!("--- SIZE: {} chars total ---\n", session.full_length),
        session.chunks[page_index].clone(),
        "\n==============================".to_string(),
    ];

    if page_index < total - 1 {
        output.push(format!(
            "SYSTEM NOTICE: content continues. To read the next part, call \
             `web_scroll(url='{}', page={})`",
            session.url,
            page_index + 1
        ));
    } else {
        output.push("SYSTEM NOTICE: end of document.".to_string());
    }

    output.join("\n")
}

/// A ±`SNIPPET_WINDOW` byte window around a match, adjusted to char
/// boundaries, with newlines flattened.
fn snippet_around(chunk: &str, start: usize, query_len: usize) -> String {
    let mut lo = start.saturating_sub(SNIPPET_WINDOW);
    while lo > 0 && !chunk.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (start + query_len + SNIPPET_WINDOW).min(chunk.len());
    while hi < chunk.len() && !chunk.is_char_boundary(hi) {
        hi += 1;
    }
    chunk[lo..hi].replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_store::MemoryCache;

    fn cache() -> WebSessionCache {
        WebSessionCache::new(Arc::new(MemoryCache::new()), 3600)
    }

    #[tokio::test]
    async fn save_and_page_view_round_trip() {
        let c = cache();
        let text = "x".repeat(CHUNK_SIZE + 100);
        c.save_session("https://example.com/doc", &text, "remote")
            .await
            .unwrap();

        let page0 = c.page_view("https://example.com/doc", 0).await;
        assert!(page0.contains("Page 0 of 1"));
        assert!(page0.contains("web_scroll(url='https://example.com/doc', page=1)"));

        let page1 = c.page_view("https://example.com/doc", 1).await;
        assert!(page1.contains("end of document"));
    }

    #[tokio::test]
    async fn page_out_of_bounds() {
        let c = cache();
        c.save_session("https://example.com/p", "short", "remote")
            .await
            .unwrap();
        let view = c.page_view("https://example.com/p", 5).await;
        assert!(view.contains("out of bounds"));
        assert!(view.contains("Total pages: 1"));
    }

    #[tokio::test]
    async fn cache_miss_message() {
        let c = cache();
        let view = c.page_view("https://example.com/none", 0).await;
        assert!(view.contains("cache miss"));
    }

    #[tokio::test]
    async fn search_finds_context_windows() {
        let c = cache();
        let text = format!(
            "{}needle in the middle{}",
            "a".repeat(CHUNK_SIZE),
            "b".repeat(CHUNK_SIZE)
        );
        c.save_session("https://example.com/s", &text, "remote")
            .await
            .unwrap();
        let out = c.search_session("https://example.com/s", "needle").await;
        assert!(out.contains("FOUND IN PAGE 1"));
        assert!(out.contains("needle in the middle"));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let c = cache();
        c.save_session("https://example.com/ci", "The Quick Brown Fox", "remote")
            .await
            .unwrap();
        let out = c.search_session("https://example.com/ci", "quick brown").await;
        assert!(out.contains("FOUND IN PAGE 0"));
    }

    #[tokio::test]
    async fn search_miss_reports_page_count() {
        let c = cache();
        c.save_session("https://example.com/m", "nothing here", "remote")
            .await
            .unwrap();
        let out = c.search_session("https://example.com/m", "absent").await;
        assert!(out.contains("'absent' not found"));
        assert!(out.contains("1 pages"));
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        let text = "é".repeat(CHUNK_SIZE); // 2 bytes each
        let chunks = chunk_text(&text);
        assert!(chunks.len() >= 2);
        let rejoined: String = chunks.concat();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn snippet_never_splits_chars() {
        let chunk = format!("{}match{}", "é".repeat(200), "ü".repeat(200));
        let start = chunk.find("match").unwrap();
        let snippet = snippet_around(&chunk, start, 5);
        assert!(snippet.contains("match"));
    }

    #[test]
    fn distinct_urls_distinct_keys() {
        assert_ne!(
            cache_key("https://a.example.com"),
            cache_key("https://b.example.com")
        );
        assert!(cache_key("https://a.example.com").starts_with("web_session:"));
    }
}
