//! Per-round observers.
//!
//! A sink sees every emitted segment and every tool call transition, in
//! order, one call at a time. Sinks must not block: they are invoked inline
//! from the stream and dispatch paths.

use std::sync::Mutex;

use loomterm_core::segment::Segment;
use loomterm_core::tool::ToolCall;
use tokio::sync::mpsc;

use crate::stream_event::AgentStreamEvent;

/// Receives segments and tool call transitions for one round.
pub trait RoundSink: Send + Sync {
    fn on_segment(&self, segment: &Segment);

    fn on_tool_call(&self, call: &ToolCall);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RoundSink for NullSink {
    fn on_segment(&self, _segment: &Segment) {}

    fn on_tool_call(&self, _call: &ToolCall) {}
}

/// Forwards events to another task over an unbounded channel.
///
/// A closed receiver is ignored; the turn keeps running.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AgentStreamEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<AgentStreamEvent>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl RoundSink for ChannelSink {
    fn on_segment(&self, segment: &Segment) {
        let _ = self.tx.send(AgentStreamEvent::from(segment));
    }

    fn on_tool_call(&self, call: &ToolCall) {
        let _ = self.tx.send(AgentStreamEvent::from(call));
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AgentStreamEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<AgentStreamEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn record(&self, event: AgentStreamEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl RoundSink for RecordingSink {
    fn on_segment(&self, segment: &Segment) {
        self.record(AgentStreamEvent::from(segment));
    }

    fn on_tool_call(&self, call: &ToolCall) {
        self.record(AgentStreamEvent::from(call));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.on_segment(&Segment::prose("a"));
        sink.on_tool_call(&ToolCall::pending("call_0_1", "grep", serde_json::Map::new()));

        assert_eq!(rx.recv().await.unwrap().event_type(), "segment");
        assert_eq!(rx.recv().await.unwrap().event_type(), "tool_call");
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.on_segment(&Segment::prose("nobody listens"));
    }

    #[test]
    fn recording_sink_keeps_events() {
        let sink = RecordingSink::new();
        sink.on_segment(&Segment::prose("one"));
        sink.on_segment(&Segment::prose("two"));
        assert_eq!(sink.events().len(), 2);
    }
}
