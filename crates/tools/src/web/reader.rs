//! The read/scroll/search surface over fetched pages.

use std::sync::Arc;

use spool_domain::Result;
use spool_store::CacheBackend;

use super::fetch::{build_client, fetch_capped, html_to_text};
use super::serp;
use super::session::WebSessionCache;

pub struct WebReader {
    client: reqwest::Client,
    sessions: WebSessionCache,
}

impl WebReader {
    pub fn new(cache: Arc<dyn CacheBackend>, ttl_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            sessions: WebSessionCache::new(cache, ttl_secs),
        })
    }

    /// Fetch a URL (cache first), chunk it into pages, and return page 0.
    pub async fn read(&self, url: &str, force_refresh: bool) -> String {
        if !force_refresh && self.sessions.get_session(url).await.is_some() {
            tracing::debug!(url, "web session cache hit");
            return self.sessions.page_view(url, 0).await;
        }

        tracing::debug!(url, "web session cache miss, fetching");
        let html = match fetch_capped(&self.client, url).await {
            Ok(body) => body,
            Err(e) => return format!("Error reading page: {e}"),
        };

        let clean = html_to_text(&html);
        if clean.len() < 50 {
            return "Error: the fetch returned no usable content. The site may be \
                    blocking automated access."
                .to_string();
        }

        if let Err(e) = self.sessions.save_session(url, &clean, "remote-fetch").await {
            tracing::warn!(url, error = %e, "failed to cache web session");
        }
        self.sessions.page_view(url, 0).await
    }

    /// Return page `page` from the cached session.
    pub async fn scroll(&self, url: &str, page: usize) -> String {
        self.sessions.page_view(url, page).await
    }

    /// Scan cached pages for a query.
    pub async fn search(&self, url: &str, query: &str) -> String {
        self.sessions.search_session(url, query).await
    }

    /// DuckDuckGo HTML SERP: fetch, parse the top results to a numbered
    /// list with extracted links.
    pub async fn serp_search(&self, query: &str) -> String {
        let url = serp::search_url(query);
        let html = match fetch_capped(&self.client, &url).await {
            Ok(body) => body,
            Err(e) => return format!("Error performing web search: {e}"),
        };
        serp::render_results(query, &html_to_text(&html))
    }
}
