//! Message, Round and Conversation domain types.
//!
//! A conversation is an append-only list of rounds. Each round is one
//! prompt → response (→ tool results) cycle; the model context is the
//! flattened messages of all committed rounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::tool::{ToolCall, ToolStatus};

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Synthetic tool-result message
    Tool,
}

/// A tool call as recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Map<String, serde_json::Value>,
}

/// One entry of a tool-result message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEntry {
    pub call_id: String,
    pub name: String,
    pub status: ToolStatus,
    pub content: String,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content as the model sees it
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Structured results carried by a tool message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultEntry>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create an assistant message that carries the calls it requested.
    pub fn assistant_with_calls(content: impl Into<String>, calls: &[ToolCall]) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = calls
            .iter()
            .map(|c| MessageToolCall {
                id: c.id.clone(),
                name: c.name.clone(),
                input: c.input.clone(),
            })
            .collect();
        msg
    }

    /// Build the synthetic tool-result message for a dispatched round.
    ///
    /// One entry per call, in the order given.
    pub fn tool_results(calls: &[ToolCall]) -> Self {
        let entries: Vec<ToolResultEntry> = calls
            .iter()
            .map(|c| ToolResultEntry {
                call_id: c.id.clone(),
                name: c.name.clone(),
                status: c.status,
                content: c.result_text(),
            })
            .collect();

        let content = entries
            .iter()
            .map(|e| {
                format!(
                    "<tool_result id=\"{}\" name=\"{}\" status=\"{}\">\n{}\n</tool_result>",
                    e.call_id, e.name, e.status, e.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_results = entries;
        msg
    }
}

/// One committed prompt → response cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Position within the conversation, starting at 0
    pub index: usize,

    /// The user prompt that opened this round; follow-up rounds inside a
    /// tool-using turn have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Message>,

    /// The model's response
    pub response: Message,

    /// Results of the tool calls the response requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Message>,
}

impl Round {
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.prompt
            .iter()
            .chain(std::iter::once(&self.response))
            .chain(self.tool_results.iter())
    }
}

/// An ordered, append-only sequence of rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    rounds: Vec<Round>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last round was committed
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            rounds: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Index the next committed round must carry.
    pub fn next_round_index(&self) -> usize {
        self.rounds.len()
    }

    /// Append a completed round. Indices must be contiguous.
    pub fn commit(&mut self, round: Round) -> crate::Result<()> {
        if round.index != self.next_round_index() {
            return Err(Error::Internal(format!(
                "round index {} does not follow {}",
                round.index,
                self.rounds.len()
            )));
        }
        self.updated_at = Utc::now();
        self.rounds.push(round);
        Ok(())
    }

    /// Flattened message context in commit order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.rounds.iter().flat_map(Round::messages)
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.messages().map(|m| m.content.len() / 4).sum()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn round(index: usize, prompt: Option<&str>, reply: &str) -> Round {
        Round {
            index,
            prompt: prompt.map(Message::user),
            response: Message::assistant(reply),
            tool_results: None,
        }
    }

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn commit_appends_in_order() {
        let mut conv = Conversation::new();
        let created = conv.created_at;
        conv.commit(round(0, Some("hi"), "hello")).unwrap();
        conv.commit(round(1, Some("again"), "sure")).unwrap();

        let contents: Vec<&str> = conv.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi", "hello", "again", "sure"]);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn commit_rejects_gaps() {
        let mut conv = Conversation::new();
        assert!(conv.commit(round(1, None, "skip")).is_err());
        assert!(conv.rounds().is_empty());
    }

    #[test]
    fn tool_result_message_keeps_call_order() {
        let mut ok = ToolCall::pending("call_0_1", "read_file", Map::new());
        ok.start().unwrap();
        ok.succeed("contents").unwrap();
        let mut bad = ToolCall::pending("call_0_2", "nope", Map::new());
        bad.fail("unknown tool").unwrap();

        let msg = Message::tool_results(&[ok, bad]);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_results.len(), 2);
        assert_eq!(msg.tool_results[0].call_id, "call_0_1");
        assert_eq!(msg.tool_results[1].content, "Error: unknown tool");
        let first = msg.content.find("call_0_1").unwrap();
        let second = msg.content.find("call_0_2").unwrap();
        assert!(first < second);
        assert!(msg.content.contains(r#"status="failed""#));
    }

    #[test]
    fn conversation_serialization_roundtrip() {
        let mut conv = Conversation::new();
        conv.commit(round(0, Some("Test message"), "ok")).unwrap();
        let json = serde_json::to_string(&conv).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conv);
    }

    #[test]
    fn conversation_token_estimate() {
        let mut conv = Conversation::new();
        // 20 chars each ≈ 5 tokens
        conv.commit(round(0, Some("12345678901234567890"), "12345678901234567890")).unwrap();
        assert_eq!(conv.estimated_tokens(), 10);
    }
}
