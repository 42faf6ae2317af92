//! Scripted provider: replays canned responses as a chunked stream.
//!
//! Used for offline sessions (`provider = "scripted"`) and by tests that
//! need a deterministic transport. Responses are picked by regex against
//! the latest user prompt, otherwise sequentially, otherwise a default.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use loomterm_core::error::ProviderError;
use loomterm_core::message::Role;
use loomterm_core::provider::{ChunkReceiver, Provider, ProviderRequest, StopReason, StreamChunk, Usage};
use regex::Regex;
use tracing::debug;

/// One canned response.
#[derive(Debug, Clone)]
pub struct Scenario {
    pattern: Option<Regex>,
    response: String,
    fail_after: Option<usize>,
}

impl Scenario {
    /// A response served in sequence to prompts no pattern claims.
    pub fn reply(response: impl Into<String>) -> Self {
        Self {
            pattern: None,
            response: response.into(),
            fail_after: None,
        }
    }

    /// A response for prompts matching `pattern` (case-insensitive).
    pub fn matching(pattern: &str, response: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Some(Regex::new(&format!("(?i){pattern}"))?),
            response: response.into(),
            fail_after: None,
        })
    }

    /// Break the stream with a network error after `fragments` fragments.
    pub fn failing_after(mut self, fragments: usize) -> Self {
        self.fail_after = Some(fragments);
        self
    }
}

/// A provider that streams scripted text.
pub struct ScriptedProvider {
    scenarios: Vec<Scenario>,
    next_sequential: Mutex<usize>,
    default_response: String,
    fragment_chars: usize,
    delay: Duration,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            scenarios: Vec::new(),
            next_sequential: Mutex::new(0),
            default_response: "I'm a scripted assistant with nothing more to say.".into(),
            fragment_chars: 4,
            delay: Duration::ZERO,
        }
    }

    /// Replies served in order, one per request.
    pub fn sequence<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().with_scenarios(replies.into_iter().map(Scenario::reply))
    }

    /// A small demo script for offline sessions.
    pub fn demo() -> Self {
        let mut provider = Self::new()
            .with_delay(Duration::from_millis(15))
            .with_default_response(
                "I'm running on the scripted provider, so my answers are canned. \
                 Try saying hello, asking for some code, or asking me to list files.",
            );
        let scripted = [
            ("^(hello|hi|hey)\\b", "Hello! I'm a **scripted** assistant. How can I help you today?"),
            (
                "code|example",
                "Here is a small example:\n\n```rust\nfn main() {\n    println!(\"hello\");\n}\n```\n\nRun it with `cargo run`.",
            ),
            (
                "list|files",
                "Let me look around.\n<tool_call>\n<invoke name=\"file_search\">\n<parameter name=\"pattern\">*</parameter>\n</invoke>\n</tool_call>",
            ),
        ];
        for (pattern, response) in scripted {
            if let Ok(scenario) = Scenario::matching(pattern, response) {
                provider.scenarios.push(scenario);
            }
        }
        provider
    }

    pub fn with_scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Characters per streamed fragment.
    pub fn with_fragment_chars(mut self, chars: usize) -> Self {
        self.fragment_chars = chars.max(1);
        self
    }

    /// Pause between fragments.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Pick the scenario for a request.
    ///
    /// Patterns only look at a user prompt; a follow-up round whose last
    /// message carries tool results goes to the sequential replies.
    fn select(&self, request: &ProviderRequest) -> (String, Option<usize>) {
        let prompt = request
            .messages
            .last()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str());

        if let Some(prompt) = prompt {
            let matched = self.scenarios.iter().find(|s| {
                s.pattern.as_ref().is_some_and(|p| p.is_match(prompt))
            });
            if let Some(s) = matched {
                return (s.response.clone(), s.fail_after);
            }
        }

        let mut next = self
            .next_sequential
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sequential = self.scenarios.iter().filter(|s| s.pattern.is_none()).nth(*next);
        match sequential {
            Some(s) => {
                *next += 1;
                (s.response.clone(), s.fail_after)
            }
            None => (self.default_response.clone(), None),
        }
    }
}

fn fragments(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (response, fail_after) = self.select(&request);
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.chars().count()).sum();
        debug!(chars = response.len(), "Scripted provider streaming response");

        let pieces = fragments(&response, self.fragment_chars);
        let delay = self.delay;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            for (i, piece) in pieces.into_iter().enumerate() {
                if fail_after == Some(i) {
                    let _ = tx
                        .send(Err(ProviderError::Network("scripted failure".into())))
                        .await;
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(StreamChunk::text(piece))).await.is_err() {
                    return;
                }
            }

            let completion_tokens = (response.chars().count() / 4) as u32;
            let prompt_tokens = (prompt_chars / 4) as u32;
            let _ = tx
                .send(Ok(StreamChunk::finished(
                    Some(StopReason::EndTurn),
                    Some(Usage {
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                    }),
                )))
                .await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomterm_core::message::Message;

    fn request(messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest {
            model: "scripted".into(),
            system: None,
            messages,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    async fn collect(provider: &ScriptedProvider, prompt: &str) -> (Vec<String>, Option<ProviderError>) {
        let mut rx = provider.stream(request(vec![Message::user(prompt)])).await.unwrap();
        let mut texts = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(chunk) if chunk.done => return (texts, None),
                Ok(chunk) => texts.extend(chunk.content),
                Err(e) => return (texts, Some(e)),
            }
        }
        (texts, None)
    }

    #[test]
    fn fragments_split_on_characters() {
        assert_eq!(fragments("héllo", 2), ["hé", "ll", "o"]);
        assert!(fragments("", 3).is_empty());
    }

    #[tokio::test]
    async fn sequential_then_default() {
        let provider = ScriptedProvider::sequence(["one", "two"]).with_default_response("fallback");
        assert_eq!(collect(&provider, "a").await.0.concat(), "one");
        assert_eq!(collect(&provider, "b").await.0.concat(), "two");
        assert_eq!(collect(&provider, "c").await.0.concat(), "fallback");
    }

    #[tokio::test]
    async fn pattern_beats_sequence() {
        let provider = ScriptedProvider::new().with_scenarios([
            Scenario::reply("in order"),
            Scenario::matching("weather", "sunny").unwrap(),
        ]);
        assert_eq!(collect(&provider, "What's the WEATHER?").await.0.concat(), "sunny");
        assert_eq!(collect(&provider, "other").await.0.concat(), "in order");
    }

    #[tokio::test]
    async fn streams_in_fragments() {
        let provider = ScriptedProvider::sequence(["abcdefg"]).with_fragment_chars(3);
        assert_eq!(collect(&provider, "x").await.0, ["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn injected_failure_after_fragments() {
        let provider = ScriptedProvider::new()
            .with_scenarios([Scenario::reply("abcdef").failing_after(1)])
            .with_fragment_chars(2);
        let (texts, err) = collect(&provider, "x").await;
        assert_eq!(texts, ["ab"]);
        assert!(matches!(err, Some(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn tool_results_skip_patterns() {
        let provider = ScriptedProvider::new().with_scenarios([
            Scenario::matching("files", "calling a tool").unwrap(),
            Scenario::reply("summary"),
        ]);
        let mut call = loomterm_core::tool::ToolCall::pending("call_0_1", "x", Default::default());
        call.fail("files missing").unwrap();
        let messages = vec![Message::user("list files"), Message::tool_results(&[call])];
        let mut rx = provider.stream(request(messages)).await.unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("summ"));
    }
}
