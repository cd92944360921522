//! DuckDuckGo HTML search-result parsing. The HTML-only endpoint is light
//! and stable enough to scrape into a numbered list the agent can pick
//! links from.

use std::sync::OnceLock;

use regex::Regex;

const MAX_RESULTS: usize = 5;

pub fn search_url(query: &str) -> String {
    let encoded: String = query
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            ' ' => "+".to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{b:02X}"))
                    .collect()
            }
        })
        .collect();
    format!("https://html.duckduckgo.com/html/?q={encoded}")
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Markdown-style [Title](url) links surviving HTML→text conversion,
    // plus bare URLs on result lines.
    RE.get_or_init(|| Regex::new(r"\((https?://[^)\s]+)\)").unwrap())
}

/// Parse converted SERP text into a numbered top-5 list. Internal
/// duckduckgo.com links are filtered out.
pub fn render_results(query: &str, text: &str) -> String {
    let mut results = Vec::new();

    for line in text.lines() {
        if results.len() >= MAX_RESULTS {
            break;
        }
        if !line.contains("](") || line.contains("duckduckgo.com") {
            continue;
        }
        let Some(caps) = link_regex().captures(line) else {
            continue;
        };
        let url = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let title = line
            .split("](")
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
            .trim();
        if title.is_empty() {
            continue;
        }
        results.push(format!("{}. **{}**\n   LINK: {}", results.len() + 1, title, url));
    }

    if results.is_empty() {
        return "No search results found. Try a broader query.".to_string();
    }

    format!(
        "--- SEARCH RESULTS FOR: '{query}' ---\n{}\n\nSYSTEM HINT: to read a result, call \
         `web_read(url='...')` on one of the links above.",
        results.join("\n")
    )
}
