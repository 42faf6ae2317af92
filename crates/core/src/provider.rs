//! Provider trait — the abstraction over model transports.
//!
//! A Provider takes the conversation context and streams back text
//! fragments. The stream ends exactly once: either with a chunk whose
//! `done` flag is set or with an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// System instructions, sent ahead of the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the response
    EndTurn,
    /// Token limit reached
    MaxTokens,
    /// A stop sequence matched
    StopSequence,
    /// Provider-side content filtering
    ContentFilter,
    /// Anything else the transport reported
    Other(String),
}

impl StopReason {
    /// Map an OpenAI-style `finish_reason`.
    pub fn from_finish_reason(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "tool_calls" => Self::EndTurn,
            "length" | "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Stop reason (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn finished(stop_reason: Option<StopReason>, usage: Option<Usage>) -> Self {
        Self {
            content: None,
            done: true,
            stop_reason,
            usage,
        }
    }
}

/// Receiving end of a streamed response.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// Every transport (OpenAI-compatible HTTP, scripted replay) implements
/// this trait. The agent never knows which one it is talking to.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a stream of response chunks.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(StopReason::from_finish_reason("stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from_finish_reason("length"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_finish_reason("weird"),
            StopReason::Other("weird".into())
        );
    }

    #[test]
    fn finished_chunk_is_done() {
        let chunk = StreamChunk::finished(Some(StopReason::EndTurn), None);
        assert!(chunk.done);
        assert!(chunk.content.is_none());
    }

    #[test]
    fn request_defaults_temperature() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model":"m","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.system.is_none());
    }
}
