//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is the owned, serializable form of what a
//! [`RoundSink`](crate::sink::RoundSink) observes, so a presentation layer
//! running on another task can consume a turn as it happens.

use loomterm_core::segment::{Segment, SegmentKind};
use loomterm_core::tool::{ToolCall, ToolStatus};
use serde::{Deserialize, Serialize};

/// Events emitted while a round streams and its tools run.
///
/// - `segment`   — a classified span of the model's response
/// - `tool_call` — a tool call was detected or changed status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// A Prose or Code segment.
    Segment {
        kind: SegmentKind,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },

    /// A tool call transition (Pending, Running, or terminal).
    ToolCall {
        id: String,
        name: String,
        status: ToolStatus,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AgentStreamEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Segment { .. } => "segment",
            Self::ToolCall { .. } => "tool_call",
        }
    }
}

impl From<&Segment> for AgentStreamEvent {
    fn from(segment: &Segment) -> Self {
        Self::Segment {
            kind: segment.kind,
            text: segment.text.clone(),
            language: segment.language.clone(),
        }
    }
}

impl From<&ToolCall> for AgentStreamEvent {
    fn from(call: &ToolCall) -> Self {
        Self::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            status: call.status,
            input: serde_json::Value::Object(call.input.clone()),
            output: call.output.clone(),
            error: call.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_segment() {
        let event = AgentStreamEvent::from(&Segment::code("ls\n", Some("sh".into())));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"segment""#));
        assert!(json.contains(r#""kind":"code""#));
        assert!(json.contains(r#""language":"sh""#));
    }

    #[test]
    fn event_serialization_tool_call() {
        let mut call = ToolCall::pending(
            "call_0_1",
            "grep",
            serde_json::json!({"pattern": "fn"}).as_object().cloned().unwrap(),
        );
        call.start().unwrap();
        let json = serde_json::to_string(&AgentStreamEvent::from(&call)).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""status":"running""#));
        assert!(!json.contains("output"));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(AgentStreamEvent::from(&Segment::prose("x")).event_type(), "segment");
        let call = ToolCall::pending("a", "b", serde_json::Map::new());
        assert_eq!(AgentStreamEvent::from(&call).event_type(), "tool_call");
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"segment","kind":"prose","text":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, AgentStreamEvent::from(&Segment::prose("hi")));
    }
}
