//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! a streaming `/chat/completions`.
//!
//! Tools travel inside the text (see the agent's tool-call grammar), so
//! requests never carry a `tools` array and tool results are sent as plain
//! user messages.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use loomterm_core::error::ProviderError;
use loomterm_core::message::{Message, Role};
use loomterm_core::provider::{ChunkReceiver, Provider, ProviderRequest, StopReason, StreamChunk, Usage};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// An OpenAI-compatible streaming provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert a request into the API message list, system prompt first.
    fn to_api_messages(system: Option<&str>, messages: &[Message]) -> Vec<ApiMessage> {
        let system = system.map(|s| ApiMessage {
            role: "system",
            content: s.to_string(),
        });
        system
            .into_iter()
            .chain(messages.iter().map(|m| ApiMessage {
                role: match m.role {
                    Role::User | Role::Tool => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                },
                content: m.content.clone(),
            }))
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system.as_deref(), &request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(item) = byte_stream.next().await {
                let bytes = match item {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for chunk in decoder.push(&bytes) {
                    let done = chunk.done;
                    if tx.send(Ok(chunk)).await.is_err() {
                        trace!(provider = %provider_name, "Receiver dropped, stopping stream");
                        return;
                    }
                    if done {
                        return;
                    }
                }
            }

            let _ = tx.send(decoder.finish()).await;
        });

        Ok(rx)
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes are split into lines before UTF-8 decoding so multi-byte
/// characters cut by the network are never mangled.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    stop_reason: Option<StopReason>,
    /// A `finish_reason` has been seen
    saw_finish: bool,
    /// Latest usage from a chunk that was not terminal
    usage: Option<Usage>,
    finished: bool,
}

impl SseDecoder {
    /// Feed raw bytes; returns decoded chunks. A chunk with `done` set is
    /// always the last one.
    fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            self.decode_line(line.trim_end_matches(['\r', '\n']), &mut out);
            if self.finished {
                break;
            }
        }
        out
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<StreamChunk>) {
        // Skip empty lines and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();

        // "[DONE]" signals end of stream
        if data == "[DONE]" {
            out.push(StreamChunk::finished(self.stop_reason.take(), self.usage.take()));
            self.finished = true;
            return;
        }

        match serde_json::from_str::<StreamResponse>(data) {
            Ok(resp) => {
                let no_choices = resp.choices.is_empty();
                if let Some(choice) = resp.choices.into_iter().next() {
                    if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                        out.push(StreamChunk::text(content));
                    }
                    if let Some(reason) = choice.finish_reason {
                        self.stop_reason = Some(StopReason::from_finish_reason(&reason));
                        self.saw_finish = true;
                    }
                }

                // Some servers attach usage to every chunk; it only ends the
                // stream after finish_reason or in a choice-less usage chunk.
                if let Some(usage) = resp.usage {
                    let usage = Usage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        total_tokens: usage.total_tokens,
                    };
                    if self.saw_finish || no_choices {
                        out.push(StreamChunk::finished(self.stop_reason.take(), Some(usage)));
                        self.finished = true;
                    } else {
                        self.usage = Some(usage);
                    }
                }
            }
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            }
        }
    }

    /// Called when the byte stream ends without a terminal event.
    fn finish(&mut self) -> Result<StreamChunk, ProviderError> {
        match self.stop_reason.take() {
            Some(reason) => Ok(StreamChunk::finished(Some(reason), self.usage.take())),
            None => Err(ProviderError::StreamInterrupted(
                "connection closed before the response finished".into(),
            )),
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
