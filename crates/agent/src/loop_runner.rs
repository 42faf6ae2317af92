//! The agent loop: model round, tool dispatch, repeat.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use loomterm_core::error::{Error, Result};
use loomterm_core::event::{DomainEvent, EventBus};
use loomterm_core::message::{Conversation, Message, Round};
use loomterm_core::provider::{Provider, ProviderRequest};
use loomterm_core::response::Response;
use loomterm_core::tool::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::prompt;
use crate::sink::RoundSink;
use crate::stream::{StreamManager, StreamOutcome};

/// Shown to the user when a turn stops at the round limit.
pub const ROUND_LIMIT_NOTICE: &str =
    "[stopped: reached the maximum number of tool rounds for this turn; ask me to continue]";

/// Where the loop is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    DispatchingTools,
    Done,
    Cancelled,
}

/// Result of one user turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// `Done` or `Cancelled`
    pub state: LoopState,
    /// The last model response seen, if any round got that far
    pub response: Option<Response>,
    /// Model requests made during the turn
    pub rounds: usize,
}

impl TurnOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.state == LoopState::Cancelled
    }

    pub fn was_truncated(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.truncated)
    }
}

/// The core agent loop that orchestrates model rounds and tool execution.
pub struct AgentLoop {
    /// The model transport
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Maximum model rounds per turn
    max_rounds: usize,

    /// Concurrent read-only tool calls per batch
    fan_out: usize,

    /// Per-call tool timeout
    tool_timeout: Duration,

    /// Overrides the default base instructions
    system_prompt: Option<String>,

    /// End Prose segments at blank lines
    paragraph_splits: bool,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            max_rounds: 25,
            fan_out: 4,
            tool_timeout: Duration::from_secs(60),
            system_prompt: None,
            paragraph_splits: false,
            event_bus,
        }
    }

    /// Set the maximum number of model rounds per turn.
    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_paragraph_splits(mut self, enabled: bool) -> Self {
        self.paragraph_splits = enabled;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run one user turn to completion or cancellation.
    ///
    /// Each round is committed to `conversation` as soon as it finishes
    /// (model answer plus tool results). A cancelled or transport-failed
    /// round is never committed; rounds finished before it stay. The failed
    /// round's partial text stays on the returned response.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        sink: &dyn RoundSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        info!(
            conversation_id = %conversation.id,
            rounds = conversation.rounds().len(),
            "Starting turn"
        );

        let system = prompt::system_prompt(self.system_prompt.as_deref(), &self.tools);
        let streams = StreamManager::new(Arc::clone(&self.provider), Arc::clone(&self.tools))
            .with_paragraph_splits(self.paragraph_splits);
        let dispatcher = ToolDispatcher::new(Arc::clone(&self.tools))
            .with_fan_out(self.fan_out)
            .with_timeout(self.tool_timeout)
            .with_event_bus(Arc::clone(&self.event_bus));

        let base = conversation.next_round_index();
        let user_message = Message::user(prompt);
        let mut in_flight: Option<Response> = None;
        let mut last: Option<Response> = None;
        let mut rounds_used = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            match state {
                LoopState::AwaitingModel => {
                    if cancel.is_cancelled() {
                        state = LoopState::Cancelled;
                        continue;
                    }

                    let index = conversation.next_round_index();
                    let opening = index == base;
                    rounds_used += 1;
                    debug!(conversation_id = %conversation.id, round = index, "Requesting model round");

                    let mut messages: Vec<Message> = conversation.messages().cloned().collect();
                    if opening {
                        messages.push(user_message.clone());
                    }

                    let request = ProviderRequest {
                        model: self.model.clone(),
                        system: Some(system.clone()),
                        messages,
                        temperature: self.temperature,
                        max_tokens: self.max_tokens,
                    };

                    let outcome = streams.start(request, index).await.run(sink, cancel).await;
                    let response = match outcome {
                        StreamOutcome::Cancelled(response) => {
                            last = Some(response);
                            state = LoopState::Cancelled;
                            continue;
                        }
                        StreamOutcome::Completed(response) => response,
                    };

                    if let Some(err) = &response.error {
                        warn!(
                            conversation_id = %conversation.id,
                            round = index,
                            error = %err,
                            "Transport failed, ending turn"
                        );
                        self.event_bus.publish(DomainEvent::TransportFailed {
                            conversation_id: conversation.id.to_string(),
                            round: index,
                            error_message: err.to_string(),
                            timestamp: Utc::now(),
                        });
                        last = Some(response);
                        state = LoopState::Done;
                        continue;
                    }

                    if response.has_tool_calls() {
                        in_flight = Some(response);
                        state = LoopState::DispatchingTools;
                    } else {
                        let round = Round {
                            index,
                            prompt: opening.then(|| user_message.clone()),
                            response: Message::assistant(response.text.clone()),
                            tool_results: None,
                        };
                        self.commit(conversation, round)?;
                        last = Some(response);
                        state = LoopState::Done;
                    }
                }

                LoopState::DispatchingTools => {
                    let Some(mut response) = in_flight.take() else {
                        return Err(Error::Internal("dispatching without a model response".into()));
                    };
                    let index = conversation.next_round_index();
                    let opening = index == base;

                    debug!(
                        round = index,
                        tool_calls = response.tool_calls.len(),
                        "Dispatching tool calls"
                    );
                    let calls = std::mem::take(&mut response.tool_calls);
                    let outcome = dispatcher.dispatch_all(calls, sink, cancel).await?;
                    response.tool_calls = outcome.calls;

                    if outcome.cancelled {
                        last = Some(response);
                        state = LoopState::Cancelled;
                        continue;
                    }

                    let round = Round {
                        index,
                        prompt: opening.then(|| user_message.clone()),
                        response: Message::assistant_with_calls(
                            response.text.clone(),
                            &response.tool_calls,
                        ),
                        tool_results: Some(Message::tool_results(&response.tool_calls)),
                    };
                    self.commit(conversation, round)?;

                    if rounds_used >= self.max_rounds {
                        warn!(
                            conversation_id = %conversation.id,
                            rounds = rounds_used,
                            "Round limit reached, stopping turn"
                        );
                        response.truncated = true;
                        state = LoopState::Done;
                    } else {
                        state = LoopState::AwaitingModel;
                    }
                    last = Some(response);
                }

                LoopState::Done => {
                    info!(
                        conversation_id = %conversation.id,
                        rounds = rounds_used,
                        "Turn complete"
                    );
                    return Ok(TurnOutcome {
                        state: LoopState::Done,
                        response: last,
                        rounds: rounds_used,
                    });
                }

                LoopState::Cancelled => {
                    let round = conversation.next_round_index();
                    info!(conversation_id = %conversation.id, round, "Turn cancelled");
                    self.event_bus.publish(DomainEvent::RoundCancelled {
                        conversation_id: conversation.id.to_string(),
                        round,
                        timestamp: Utc::now(),
                    });
                    return Ok(TurnOutcome {
                        state: LoopState::Cancelled,
                        response: last,
                        rounds: rounds_used,
                    });
                }
            }
        }
    }

    fn commit(&self, conversation: &mut Conversation, round: Round) -> Result<()> {
        let index = round.index;
        let tool_calls = round.response.tool_calls.len();
        conversation.commit(round)?;
        debug!(conversation_id = %conversation.id, round = index, "Round committed");
        self.event_bus.publish(DomainEvent::RoundCompleted {
            conversation_id: conversation.id.to_string(),
            round: index,
            tool_calls,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use async_trait::async_trait;
    use loomterm_core::error::ProviderError;
    use loomterm_core::message::Role;
    use loomterm_core::provider::{ChunkReceiver, StopReason, StreamChunk};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// A mock provider that replays fixed responses in order and records
    /// every request it sees.
    struct MockProvider {
        responses: Mutex<Vec<String>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl MockProvider {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str { "mock" }

        async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let text = self.responses.lock().unwrap().pop().unwrap_or_default();
            let (tx, rx) = mpsc::channel(4);
            tx.send(Ok(StreamChunk::text(text))).await.unwrap();
            tx.send(Ok(StreamChunk::finished(Some(StopReason::EndTurn), None)))
                .await
                .unwrap();
            Ok(rx)
        }
    }

    fn agent(provider: Arc<MockProvider>) -> AgentLoop {
        AgentLoop::new(
            provider,
            "mock-model",
            0.7,
            Arc::new(ToolRegistry::new()),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(MockProvider::new(&["Hello! How can I help?"]));
        let mut conv = Conversation::new();

        let outcome = agent(provider.clone())
            .run_turn(&mut conv, "Hello!", &NullSink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, LoopState::Done);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.response.unwrap().text, "Hello! How can I help?");
        // User + Assistant in a single round
        let roles: Vec<Role> = conv.messages().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
        assert_eq!(conv.rounds()[0].index, 0);
    }

    #[tokio::test]
    async fn context_carries_previous_rounds() {
        let provider = Arc::new(MockProvider::new(&["first", "second"]));
        let agent = agent(provider.clone()).with_system_prompt("be brief");
        let mut conv = Conversation::new();
        let cancel = CancellationToken::new();

        agent.run_turn(&mut conv, "one", &NullSink, &cancel).await.unwrap();
        agent.run_turn(&mut conv, "two", &NullSink, &cancel).await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let contents: Vec<&str> = requests[1].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "first", "two"]);
        assert_eq!(requests[1].system.as_deref(), Some("be brief"));
        assert_eq!(conv.rounds().len(), 2);
        assert_eq!(conv.rounds()[1].index, 1);
    }

    #[tokio::test]
    async fn unknown_tool_result_goes_back_to_model() {
        let provider = Arc::new(MockProvider::new(&[
            "<tool_call><invoke name=\"missing\"></invoke></tool_call>",
            "Sorry, that tool does not exist.",
        ]));
        let mut conv = Conversation::new();

        let outcome = agent(provider.clone())
            .run_turn(&mut conv, "do it", &NullSink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 2);
        let first = &conv.rounds()[0];
        let results = first.tool_results.as_ref().unwrap();
        assert_eq!(results.role, Role::Tool);
        assert!(results.content.contains("Error: unknown tool: missing"));
        assert!(conv.rounds()[1].prompt.is_none());
    }

    #[tokio::test]
    async fn cancelled_before_start_changes_nothing() {
        let provider = Arc::new(MockProvider::new(&["never"]));
        let mut conv = Conversation::new();
        let before = serde_json::to_string(&conv).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = agent(provider.clone())
            .run_turn(&mut conv, "hi", &NullSink, &cancel)
            .await
            .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.rounds, 0);
        assert_eq!(serde_json::to_string(&conv).unwrap(), before);
        assert!(provider.requests.lock().unwrap().is_empty());
    }
}
