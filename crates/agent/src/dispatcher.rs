//! Tool dispatch: lookup, validation, bounded concurrent execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use loomterm_core::error::{Result, ToolError};
use loomterm_core::event::{DomainEvent, EventBus};
use loomterm_core::tool::{ToolCall, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sink::RoundSink;

/// Calls after dispatch, in detection order.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub calls: Vec<ToolCall>,
    /// Cancellation was observed; calls not yet started are still Pending
    pub cancelled: bool,
}

/// Validates and executes tool calls against a registry.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    fan_out: usize,
    timeout: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            fan_out: 4,
            timeout: Duration::from_secs(60),
            event_bus: None,
        }
    }

    /// Maximum number of calls running at once within a batch.
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// Per-call execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run one call to a terminal status.
    ///
    /// Tool failures end up on the call; only an illegal status transition
    /// is returned as an error.
    pub async fn execute(&self, mut call: ToolCall, sink: &dyn RoundSink) -> Result<ToolCall> {
        let started = Instant::now();

        let Some(def) = self.registry.lookup(&call.name) else {
            warn!(call_id = %call.id, tool = %call.name, "Unknown tool requested");
            call.fail(ToolError::NotFound(call.name.clone()).to_string())?;
            self.finished(&call, started, sink);
            return Ok(call);
        };

        if let Err(reason) = def.input_schema.validate(&call.input) {
            debug!(call_id = %call.id, tool = %call.name, %reason, "Tool input rejected");
            let err = ToolError::SchemaViolation {
                tool_name: call.name.clone(),
                reason,
            };
            call.fail(err.to_string())?;
            self.finished(&call, started, sink);
            return Ok(call);
        }

        call.start()?;
        sink.on_tool_call(&call);
        debug!(call_id = %call.id, tool = %call.name, "Executing tool");

        let result = tokio::time::timeout(self.timeout, def.tool().invoke(&call.input)).await;
        match result {
            Ok(Ok(output)) => call.succeed(output)?,
            Ok(Err(e)) => {
                warn!(call_id = %call.id, tool = %call.name, error = %e, "Tool execution failed");
                call.fail(e.to_string())?;
            }
            Err(_) => {
                let err = ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: self.timeout.as_secs(),
                };
                warn!(call_id = %call.id, tool = %call.name, "Tool timed out");
                call.fail(err.to_string())?;
            }
        }

        self.finished(&call, started, sink);
        Ok(call)
    }

    /// Execute a round's calls and return them in detection order.
    ///
    /// Consecutive read-only calls run concurrently (bounded by the fan-out
    /// limit); a mutating call runs on its own. Cancellation is checked before
    /// each call starts; calls already running are left to finish.
    pub async fn dispatch_all(
        &self,
        calls: Vec<ToolCall>,
        sink: &dyn RoundSink,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        let mut done = Vec::with_capacity(calls.len());

        for batch in self.batches(calls) {
            debug!(size = batch.len(), "Dispatching tool batch");
            let results: Vec<Result<ToolCall>> = stream::iter(batch)
                .map(|call| async move {
                    if cancel.is_cancelled() {
                        return Ok(call);
                    }
                    self.execute(call, sink).await
                })
                .buffered(self.fan_out)
                .collect()
                .await;

            for result in results {
                done.push(result?);
            }
        }

        Ok(DispatchOutcome {
            calls: done,
            cancelled: cancel.is_cancelled(),
        })
    }

    fn batches(&self, calls: Vec<ToolCall>) -> Vec<Vec<ToolCall>> {
        let mut batches = Vec::new();
        let mut shared = Vec::new();
        for call in calls {
            let mutating = self
                .registry
                .lookup(&call.name)
                .is_some_and(|def| def.mutating);
            if mutating {
                if !shared.is_empty() {
                    batches.push(std::mem::take(&mut shared));
                }
                batches.push(vec![call]);
            } else {
                shared.push(call);
            }
        }
        if !shared.is_empty() {
            batches.push(shared);
        }
        batches
    }

    fn finished(&self, call: &ToolCall, started: Instant, sink: &dyn RoundSink) {
        sink.on_tool_call(call);
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: call.output.is_some(),
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{NullSink, RecordingSink};
    use crate::stream_event::AgentStreamEvent;
    use async_trait::async_trait;
    use loomterm_core::schema::{FieldType, InputSchema};
    use loomterm_core::tool::{Tool, ToolStatus};
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps for `ms`, then echoes `text`; tracks peak concurrency.
    struct Sleepy {
        name: &'static str,
        mutating: bool,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "sleeps" }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new()
                .required("text", FieldType::String, "echo")
                .optional("ms", FieldType::Integer, "delay")
        }
        fn is_mutating(&self) -> bool { self.mutating }
        async fn invoke(&self, input: &Map<String, Value>) -> std::result::Result<String, ToolError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let ms = input.get("ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let text = input["text"].as_str().unwrap_or_default();
            if text == "boom" {
                return Err(ToolError::failed(self.name, "exploded"));
            }
            Ok(text.to_string())
        }
    }

    struct Fixture {
        registry: Arc<ToolRegistry>,
        peak: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        for (name, mutating) in [("read", false), ("write", true)] {
            registry
                .register(Arc::new(Sleepy {
                    name,
                    mutating,
                    active: Arc::clone(&active),
                    peak: Arc::clone(&peak),
                }))
                .unwrap();
        }
        Fixture {
            registry: Arc::new(registry),
            peak,
        }
    }

    fn call(id: &str, name: &str, input: Value) -> ToolCall {
        ToolCall::pending(id, name, input.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_running() {
        let f = fixture();
        let sink = RecordingSink::new();
        let out = ToolDispatcher::new(f.registry)
            .execute(call("c1", "nope", json!({})), &sink)
            .await
            .unwrap();
        assert_eq!(out.status, ToolStatus::Failed);
        assert_eq!(out.error.as_deref(), Some("unknown tool: nope"));
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn schema_violation_reports_first_problem() {
        let f = fixture();
        let out = ToolDispatcher::new(f.registry)
            .execute(call("c1", "read", json!({"ms": "soon"})), &NullSink)
            .await
            .unwrap();
        assert_eq!(out.status, ToolStatus::Failed);
        assert_eq!(
            out.error.as_deref(),
            Some("invalid input for read: missing required field 'text'")
        );
    }

    #[tokio::test]
    async fn tool_failure_is_data() {
        let f = fixture();
        let sink = RecordingSink::new();
        let out = ToolDispatcher::new(f.registry)
            .execute(call("c1", "read", json!({"text": "boom"})), &sink)
            .await
            .unwrap();
        assert_eq!(out.status, ToolStatus::Failed);
        assert_eq!(out.error.as_deref(), Some("read failed: exploded"));

        let statuses: Vec<ToolStatus> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                AgentStreamEvent::ToolCall { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, [ToolStatus::Running, ToolStatus::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_the_call() {
        let f = fixture();
        let out = ToolDispatcher::new(f.registry)
            .with_timeout(Duration::from_millis(10))
            .execute(call("c1", "read", json!({"text": "slow", "ms": 1000})), &NullSink)
            .await
            .unwrap();
        assert_eq!(out.status, ToolStatus::Failed);
        assert!(out.error.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn results_keep_detection_order() {
        let f = fixture();
        let calls = vec![
            call("c1", "read", json!({"text": "first", "ms": 50})),
            call("c2", "read", json!({"text": "second", "ms": 1})),
            call("c3", "read", json!({"text": "third", "ms": 20})),
        ];
        let out = ToolDispatcher::new(f.registry)
            .dispatch_all(calls, &NullSink, &CancellationToken::new())
            .await
            .unwrap();
        let outputs: Vec<&str> = out.calls.iter().filter_map(|c| c.output.as_deref()).collect();
        assert_eq!(outputs, ["first", "second", "third"]);
        assert!(!out.cancelled);
        assert_eq!(f.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_bounds_concurrency() {
        let f = fixture();
        let calls = (0..6)
            .map(|i| call(&format!("c{i}"), "read", json!({"text": "x", "ms": 10})))
            .collect();
        ToolDispatcher::new(f.registry)
            .with_fan_out(2)
            .dispatch_all(calls, &NullSink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(f.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn mutating_calls_run_alone() {
        let f = fixture();
        let calls = vec![
            call("c1", "read", json!({"text": "a", "ms": 10})),
            call("c2", "write", json!({"text": "b", "ms": 10})),
            call("c3", "read", json!({"text": "c", "ms": 10})),
        ];
        let out = ToolDispatcher::new(Arc::clone(&f.registry))
            .dispatch_all(calls, &NullSink, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.calls.iter().all(|c| c.status == ToolStatus::Succeeded));
        assert_eq!(f.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_dispatch_leaves_calls_pending() {
        let f = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = ToolDispatcher::new(f.registry)
            .dispatch_all(vec![call("c1", "read", json!({"text": "a"}))], &NullSink, &cancel)
            .await
            .unwrap();
        assert!(out.cancelled);
        assert_eq!(out.calls[0].status, ToolStatus::Pending);
    }

    #[tokio::test]
    async fn publishes_tool_executed() {
        let f = fixture();
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        ToolDispatcher::new(f.registry)
            .with_event_bus(Arc::clone(&bus))
            .execute(call("c1", "read", json!({"text": "a"})), &NullSink)
            .await
            .unwrap();
        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "read");
                assert!(success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
