//! `web_fetch`: GET a URL and return the body as text.

use std::time::Duration;

use async_trait::async_trait;
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use reqwest::Url;
use serde_json::{Map, Value};

use crate::str_arg;

pub(crate) const USER_AGENT: &str = concat!("loomterm/", env!("CARGO_PKG_VERSION"));
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct WebFetchTool {
    client: reqwest::Client,
    max_chars: usize,
}

impl WebFetchTool {
    pub fn new(max_chars: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, max_chars }
    }
}

/// Only absolute http(s) URLs with a host are fetched.
fn parse_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "invalid URL scheme '{}'. Only http and https are supported.",
            url.scheme()
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("invalid URL: missing host".into());
    }
    Ok(url)
}

pub(crate) fn truncate_chars(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}\n... (truncated, {total} total chars)")
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch the contents of a URL."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().required("url", FieldType::String, "URL to fetch.")
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let raw = str_arg(input, "url").unwrap_or_default();
        let url = parse_url(raw).map_err(ToolError::InvalidArguments)?;

        tracing::debug!(%url, "Fetching URL");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(self.name(), format!("HTTP {status}")));
        }
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;

        tracing::debug!(chars = text.len(), "Fetched URL");
        Ok(truncate_chars(text, self.max_chars))
    }
}
