//! Drives one model response stream into segments, tool calls and a final
//! [`Response`].
//!
//! [`ResponseAssembler`] is the synchronous pipeline
//! (ChunkBuffer → tool-marker scan → FenceDetector) and has no transport.
//! [`StreamManager`] opens the transport and feeds chunks into an assembler
//! until the stream ends, fails, or is cancelled.

use std::sync::Arc;

use loomterm_core::error::ProviderError;
use loomterm_core::provider::{ChunkReceiver, Provider, ProviderRequest};
use loomterm_core::response::Response;
use loomterm_core::segment::Segment;
use loomterm_core::tool::{ToolCall, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::buffer::ChunkBuffer;
use super::fence::{is_fence_line, FenceDetector, FenceState};
use super::marker::{self, TOOL_CLOSE, TOOL_OPEN};
use crate::sink::RoundSink;

/// Incremental response assembly for a single round.
pub struct ResponseAssembler {
    buffer: ChunkBuffer,
    detector: FenceDetector,
    /// Text of a tool block whose closing tag has not arrived yet
    block: Option<String>,
    text: String,
    calls: Vec<ToolCall>,
    round: usize,
    registry: Arc<ToolRegistry>,
}

impl ResponseAssembler {
    pub fn new(registry: Arc<ToolRegistry>, round: usize) -> Self {
        Self {
            buffer: ChunkBuffer::new(),
            detector: FenceDetector::new(),
            block: None,
            text: String::new(),
            calls: Vec::new(),
            round,
            registry,
        }
    }

    pub fn with_paragraph_splits(mut self, enabled: bool) -> Self {
        self.detector = FenceDetector::new().with_paragraph_splits(enabled);
        self
    }

    /// Calls detected so far, in marker order.
    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.calls
    }

    /// Accept one raw fragment and emit whatever became stable.
    pub fn push(&mut self, fragment: &str, sink: &dyn RoundSink) {
        if fragment.is_empty() {
            return;
        }
        self.text.push_str(fragment);
        self.buffer.append(fragment);

        let pending = self.buffer.pending();
        let reserve = self
            .detector
            .reserve_tail(pending)
            .max(marker::partial_open_suffix(pending));
        let stable = self.buffer.drain_stable(reserve);
        self.process(stable, sink);
    }

    /// Flush everything at end of stream and build the response.
    pub fn finish(mut self, sink: &dyn RoundSink) -> Response {
        let rest = self.buffer.flush_all();
        self.process(rest, sink);

        if let Some(block) = self.block.take() {
            warn!(
                round = self.round,
                bytes = block.len(),
                "Tool block never closed, keeping it as prose"
            );
            self.detector.push_literal(&block);
        }

        let segments = self.detector.finish();
        emit(segments, sink);

        Response {
            text: self.text,
            tool_calls: self.calls,
            ..Response::default()
        }
    }

    /// Stop without flushing: the response keeps what arrived so far.
    pub fn abandon(self) -> Response {
        Response {
            text: self.text,
            tool_calls: self.calls,
            ..Response::default()
        }
    }

    fn process(&mut self, mut pending: String, sink: &dyn RoundSink) {
        while !pending.is_empty() {
            if let Some(block) = self.block.as_mut() {
                block.push_str(&pending);
                let Some(end) = block.find(TOOL_CLOSE) else {
                    return;
                };
                pending = block.split_off(end + TOOL_CLOSE.len());
                if let Some(block) = self.block.take() {
                    self.complete_block(&block, sink);
                }
                continue;
            }

            let piece_end = pending.find('\n').map_or(pending.len(), |idx| idx + 1);
            if self.scans_for_markers(&pending[..piece_end]) {
                if let Some(start) = pending[..piece_end].find(TOOL_OPEN) {
                    let before: String = pending.drain(..start).collect();
                    emit(self.detector.feed(&before), sink);
                    if let Some(segment) = self.detector.cut() {
                        sink.on_segment(&segment);
                    }
                    self.block = Some(String::new());
                    continue;
                }
            }

            let piece: String = pending.drain(..piece_end).collect();
            emit(self.detector.feed(&piece), sink);
        }
    }

    /// Tool markers only count in Prose, and never on a fence line.
    fn scans_for_markers(&self, piece: &str) -> bool {
        if self.detector.state() != FenceState::Prose {
            return false;
        }
        if !self.detector.at_line_start() {
            return true;
        }
        let mut line = self.detector.partial_line().to_string();
        line.push_str(piece);
        !is_fence_line(&line)
    }

    fn complete_block(&mut self, block: &str, sink: &dyn RoundSink) {
        let calls = marker::build_calls(block, self.round, self.calls.len(), &self.registry);
        if calls.is_empty() {
            warn!(round = self.round, "Tool block without a parseable invoke, dropping it");
        }
        for call in calls {
            debug!(round = self.round, call_id = %call.id, tool = %call.name, "Tool call detected");
            sink.on_tool_call(&call);
            self.calls.push(call);
        }
        self.detector.continue_line();
    }
}

fn emit(segments: Vec<Segment>, sink: &dyn RoundSink) {
    for segment in &segments {
        sink.on_segment(segment);
    }
}

/// How a stream ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The transport finished or failed; check `Response::error`.
    Completed(Response),
    /// Cancellation was requested at a chunk boundary.
    Cancelled(Response),
}

impl StreamOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn response(&self) -> &Response {
        match self {
            Self::Completed(r) | Self::Cancelled(r) => r,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            Self::Completed(r) | Self::Cancelled(r) => r,
        }
    }
}

/// Opens model streams and wires them to an assembler.
pub struct StreamManager {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    paragraph_splits: bool,
}

impl StreamManager {
    pub fn new(provider: Arc<dyn Provider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            paragraph_splits: false,
        }
    }

    pub fn with_paragraph_splits(mut self, enabled: bool) -> Self {
        self.paragraph_splits = enabled;
        self
    }

    /// Open the transport for one round.
    ///
    /// A transport that refuses to open still yields a handle; running it
    /// resolves immediately with the error on the response.
    pub async fn start(&self, request: ProviderRequest, round: usize) -> StreamHandle {
        debug!(
            provider = self.provider.name(),
            round,
            messages = request.messages.len(),
            "Opening model stream"
        );
        let source = self.provider.stream(request).await;
        StreamHandle {
            source,
            assembler: ResponseAssembler::new(Arc::clone(&self.registry), round)
                .with_paragraph_splits(self.paragraph_splits),
            round,
        }
    }
}

/// One in-flight model response.
pub struct StreamHandle {
    source: Result<ChunkReceiver, ProviderError>,
    assembler: ResponseAssembler,
    round: usize,
}

impl StreamHandle {
    /// Consume the stream to its end.
    ///
    /// Cancellation is checked before every chunk. Once the transport
    /// reports an error no further chunks are read; segments already
    /// emitted stay valid.
    pub async fn run(self, sink: &dyn RoundSink, cancel: &CancellationToken) -> StreamOutcome {
        let Self {
            source,
            mut assembler,
            round,
        } = self;

        let mut rx = match source {
            Ok(rx) => rx,
            Err(e) => {
                warn!(round, error = %e, "Model stream failed to open");
                let mut response = assembler.finish(sink);
                response.error = Some(e);
                return StreamOutcome::Completed(response);
            }
        };

        let mut stop_reason = None;
        let mut usage = None;
        let mut error = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(round, "Stream cancelled at chunk boundary");
                    return StreamOutcome::Cancelled(assembler.abandon());
                }
                next = rx.recv() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Some(content) = chunk.content.as_deref() {
                        assembler.push(content, sink);
                    }
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                    if chunk.done {
                        stop_reason = chunk.stop_reason;
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(round, error = %e, "Model stream failed mid-response");
                    error = Some(e);
                    break;
                }
                None => {
                    warn!(round, "Model stream closed without a terminal chunk");
                    error = Some(ProviderError::StreamInterrupted(
                        "transport closed before the response finished".into(),
                    ));
                    break;
                }
            }
        }
        drop(rx);

        let mut response = assembler.finish(sink);
        response.stop_reason = stop_reason;
        response.usage = usage;
        response.error = error;
        debug!(
            round,
            bytes = response.text.len(),
            tool_calls = response.tool_calls.len(),
            "Model stream finished"
        );
        StreamOutcome::Completed(response)
    }
}
