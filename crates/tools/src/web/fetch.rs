//! Outbound page fetching with strict limits.
//!
//! Safety properties:
//! - http/https only; hostnames resolving to private/internal ranges are
//!   rejected before any request is made
//! - hard timeout, capped response size, redirect limit (5 hops)
//! - User-Agent identifies the gateway

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Url;
use spool_domain::{Error, Result};

const MAX_BYTES: usize = 5 * 1024 * 1024;
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Returns `true` for loopback, private, link-local, and other
/// non-public address ranges.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || is_v4_shared_address(v4)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || is_v6_unique_local(v6)
                || is_v6_link_local(v6)
        }
    }
}

/// 100.64.0.0/10 — shared address space (CGNAT).
fn is_v4_shared_address(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xC0) == 64
}

/// fc00::/7 unique-local.
fn is_v6_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xFE00) == 0xFC00
}

/// fe80::/10 link-local.
fn is_v6_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xFFC0) == 0xFE80
}

/// Validate a URL before fetching: scheme allow-list plus DNS resolution
/// with a private-range check on every resolved address.
pub fn validate_url(raw_url: &str) -> Result<()> {
    let parsed = Url::parse(raw_url).map_err(|e| Error::Validation(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Validation(format!(
                "blocked scheme: {other}:// (only http/https allowed)"
            )))
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Validation("URL has no host".into()))?;
    let port = parsed.port_or_known_default().unwrap_or(80);

    let addrs: Vec<_> = format!("{host}:{port}")
        .to_socket_addrs()
        .map_err(|e| Error::Validation(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Validation(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }
    for addr in &addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::Validation(format!(
                "blocked request to private address: {host} resolves to {}",
                addr.ip()
            )));
        }
    }
    Ok(())
}

pub(crate) fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

/// Fetch a page body, streaming with a byte cap.
pub(crate) async fn fetch_capped(client: &reqwest::Client, url: &str) -> Result<String> {
    validate_url(url)?;

    let resp = client
        .get(url)
        .header(
            reqwest::header::USER_AGENT,
            "Spool/0.1 (inference-gateway)",
        )
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/json,text/plain",
        )
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Http(format!("GET {url}: HTTP {}", status.as_u16())));
    }

    let mut body = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Http(e.to_string()))?;
        body.extend_from_slice(&chunk);
        if body.len() > MAX_BYTES {
            body.truncate(MAX_BYTES);
            break;
        }
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Pull the `href` value out of an anchor tag body (the text between `<`
/// and `>`). Handles double-quoted, single-quoted, and bare values.
fn extract_href(tag: &str) -> Option<String> {
    // Byte positions line up between the tag and its ASCII-lowercased
    // copy, so the attribute search is case-insensitive while the value
    // keeps its original case.
    let lower = tag.to_ascii_lowercase();
    let idx = lower.find("href")?;
    let rest = tag[idx + 4..].trim_start().strip_prefix('=')?.trim_start();
    let href = match rest.as_bytes().first()? {
        b'"' => rest[1..].split('"').next()?,
        b'\'' => rest[1..].split('\'').next()?,
        _ => rest.split(char::is_whitespace).next()?,
    };
    (!href.is_empty()).then(|| href.to_string())
}

/// HTML-to-text extraction without external dependencies: strips tags,
/// drops script/style bodies, decodes common entities, collapses
/// whitespace while keeping line structure. Anchor targets survive as
/// `[text](href)` links so callers (the SERP parser in particular) can
/// still follow them.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_buf = String::new();
    let mut pending_href: Option<String> = None;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag_buf.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let tag_lower = tag_buf.to_ascii_lowercase();
                let is_closing = tag_lower.starts_with('/');
                let name = tag_lower
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("");

                match (is_closing, name) {
                    (false, "script") => in_script = true,
                    (true, "script") => in_script = false,
                    (false, "style") => in_style = true,
                    (true, "style") => in_style = false,
                    (false, "a") if !in_script && !in_style => {
                        if let Some(href) = extract_href(&tag_buf) {
                            out.push('[');
                            pending_href = Some(href);
                        }
                    }
                    (true, "a") => {
                        if let Some(href) = pending_href.take() {
                            out.push_str("](");
                            out.push_str(&href);
                            out.push(')');
                        }
                    }
                    (
                        true,
                        "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr"
                        | "article" | "section" | "blockquote",
                    ) => {
                        // A line break inside an open anchor would split
                        // the [text](href) pair across lines.
                        if pending_href.is_some() {
                            out.push(' ');
                        } else if !out.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                    (false, "br") => {
                        out.push(if pending_href.is_some() { ' ' } else { '\n' })
                    }
                    _ => {}
                }

                tag_buf.clear();
            }
            _ if in_tag => tag_buf.push(ch),
            _ if in_script || in_style => {}
            '\n' | '\r' if pending_href.is_some() => out.push(' '),
            _ => out.push(ch),
        }
    }

    let out = out
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let mut result = String::new();
    let mut prev_newline = false;
    for line in out.lines() {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            if !prev_newline {
                result.push('\n');
                prev_newline = true;
            }
        } else {
            result.push_str(&trimmed);
            result.push('\n');
            prev_newline = false;
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("ftp://example.com/x").is_err());
        assert!(validate_url("gopher://example.com").is_err());
    }

    #[test]
    fn rejects_loopback_and_private_hosts() {
        assert!(validate_url("http://127.0.0.1/admin").is_err());
        assert!(validate_url("http://localhost:8080/").is_err());
        assert!(validate_url("http://192.168.1.1/").is_err());
        assert!(validate_url("http://10.0.0.5/").is_err());
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("http://").is_err());
    }

    #[test]
    fn private_ip_tables() {
        assert!(is_private_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"10.1.2.3".parse().unwrap()));
        assert!(is_private_ip(&"172.16.0.1".parse().unwrap()));
        assert!(is_private_ip(&"169.254.0.1".parse().unwrap()));
        assert!(is_private_ip(&"100.64.0.1".parse().unwrap()));
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
        assert!(!is_private_ip(&"93.184.216.34".parse().unwrap()));
        assert!(!is_private_ip(&"2606:2800:220:1::1".parse().unwrap()));
    }

    #[test]
    fn html_strips_tags_and_scripts() {
        let html = "<html><head><style>body{}</style></head>\
                    <body><h1>Title</h1><script>var x=1;</script>\
                    <p>First &amp; second</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("First & second"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("body{}"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn html_keeps_block_structure() {
        let html = "<p>one</p><p>two</p>";
        let text = html_to_text(html);
        assert_eq!(text, "one\ntwo");
    }

    #[test]
    fn html_entities_decoded() {
        assert_eq!(html_to_text("a &lt;tag&gt; &quot;x&quot;"), "a <tag> \"x\"");
    }

    #[test]
    fn anchor_targets_preserved_as_links() {
        let html = r#"<p>See <a href="https://example.com/docs">the docs</a> for more.</p>"#;
        assert_eq!(
            html_to_text(html),
            "See [the docs](https://example.com/docs) for more."
        );
    }

    #[test]
    fn anchor_href_quote_styles() {
        assert_eq!(
            html_to_text("<a href='https://example.com/a'>one</a>"),
            "[one](https://example.com/a)"
        );
        assert_eq!(
            html_to_text("<a href=https://example.com/b>two</a>"),
            "[two](https://example.com/b)"
        );
        assert_eq!(
            html_to_text(r#"<a rel="nofollow" class="result__a" HREF="https://example.com/c">three</a>"#),
            "[three](https://example.com/c)"
        );
    }

    #[test]
    fn anchor_without_href_passes_text_through() {
        assert_eq!(html_to_text(r#"<a name="top">Top</a>"#), "Top");
    }

    #[test]
    fn anchor_spanning_lines_stays_on_one_line() {
        let html = "<a href=\"https://example.com/\">\n  Split\n  Title\n</a>";
        assert_eq!(html_to_text(html), "[ Split Title ](https://example.com/)");
    }

    #[test]
    fn href_entities_decoded_in_link() {
        let html = r#"<a href="https://example.com/?a=1&amp;b=2">q</a>"#;
        assert_eq!(html_to_text(html), "[q](https://example.com/?a=1&b=2)");
    }
}
