//! `web_search`: DuckDuckGo's HTML endpoint, scraped into title/URL pairs.

use std::sync::LazyLock;

use async_trait::async_trait;
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use regex::Regex;
use reqwest::Url;
use serde_json::{Map, Value};

use crate::str_arg;
use crate::web_fetch::{HTTP_TIMEOUT, USER_AGENT};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 10;

static RESULT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#)
        .expect("result link regex")
});
static RESULT_LINK_ALT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]+href="([^"]*)"[^>]*class="[^"]*result[^"]*"[^>]*>(.*?)</a>"#)
        .expect("alternate result link regex")
});
static ANY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]+href="(https?://[^"]+)"[^>]*>([^<]+)</a>"#).expect("link regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

pub struct WebSearchTool {
    client: reqwest::Client,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSearchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
}

/// Follow DuckDuckGo's `/l/?uddg=` redirect wrapper to the real target.
fn unwrap_redirect(href: &str) -> String {
    let href = decode_entities(href);
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.clone()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(href)
}

/// Extract `(title, url)` pairs, trying progressively looser patterns.
fn parse_results(html: &str) -> Vec<(String, String)> {
    let clean = |raw: &str| decode_entities(TAG.replace_all(raw, "").trim());

    let primary: Vec<_> = RESULT_LINK
        .captures_iter(html)
        .map(|c| (clean(&c[2]), unwrap_redirect(&c[1])))
        .filter(|(title, href)| !title.is_empty() && !href.is_empty())
        .collect();
    if !primary.is_empty() {
        return primary;
    }

    let alternate: Vec<_> = RESULT_LINK_ALT
        .captures_iter(html)
        .map(|c| (clean(&c[2]), unwrap_redirect(&c[1])))
        .filter(|(title, href)| title.chars().count() > 2 && !href.is_empty())
        .collect();
    if !alternate.is_empty() {
        return alternate;
    }

    let mut seen = std::collections::HashSet::new();
    ANY_LINK
        .captures_iter(html)
        .map(|c| (clean(&c[2]), c[1].to_string()))
        .filter(|(title, href)| !title.is_empty() && seen.insert(href.clone()))
        .collect()
}

fn format_results(query: &str, results: &[(String, String)]) -> String {
    if results.is_empty() {
        return format!("No results found for '{query}'");
    }
    let formatted = results
        .iter()
        .take(MAX_RESULTS)
        .map(|(title, href)| format!("- {title}\n  {href}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Search results for '{query}':\n\n{formatted}")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns result titles and URLs."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().required("query", FieldType::String, "Search query.")
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let query = str_arg(input, "query").unwrap_or_default();
        tracing::debug!(query, "Web search");

        let html = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolError::failed(self.name(), e))?
            .text()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;

        let results = parse_results(&html);
        tracing::debug!(count = results.len(), "Search results parsed");
        Ok(format_results(query, &results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result">
  <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F&amp;rut=abc">The <b>Rust</b> Programming Language</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://crates.io/">crates.io: Rust Package Registry</a>
</div>
"#;

    #[test]
    fn parses_primary_results() {
        let results = parse_results(PAGE);
        assert_eq!(
            results,
            [
                ("The Rust Programming Language".to_string(), "https://doc.rust-lang.org/book/".to_string()),
                ("crates.io: Rust Package Registry".to_string(), "https://crates.io/".to_string()),
            ]
        );
    }

    #[test]
    fn falls_back_to_plain_links() {
        let html = r#"<a href="https://a.example/">A site</a> <a href="https://a.example/">dup</a> <a href="/rel">x</a>"#;
        assert_eq!(
            parse_results(html),
            [("A site".to_string(), "https://a.example/".to_string())]
        );
    }

    #[test]
    fn formats_and_caps() {
        let results: Vec<_> = (0..12)
            .map(|i| (format!("t{i}"), format!("https://e.com/{i}")))
            .collect();
        let out = format_results("q", &results);
        assert!(out.starts_with("Search results for 'q':\n\n- t0\n  https://e.com/0"));
        assert_eq!(out.matches("\n- ").count(), MAX_RESULTS);
        assert_eq!(format_results("q", &[]), "No results found for 'q'");
    }
}
