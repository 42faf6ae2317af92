//! The loomterm agent core.
//!
//! A turn follows a **stream → dispatch → repeat** cycle:
//!
//! 1. **Send** the conversation plus the new prompt to the model
//! 2. **Stream** the response through the segmentation pipeline, emitting
//!    Prose/Code segments and detecting tool-call blocks as they complete
//! 3. **If tool calls**: validate and execute them, attach the results in
//!    call order, loop back to step 1
//! 4. **If text only**: commit the turn's rounds and stop
//!
//! The loop also stops at the round limit, on a transport failure, or when
//! the caller cancels.

pub mod dispatcher;
pub mod loop_runner;
pub mod prompt;
pub mod sink;
pub mod stream;
pub mod stream_event;

pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use loop_runner::{AgentLoop, LoopState, ROUND_LIMIT_NOTICE, TurnOutcome};
pub use sink::{ChannelSink, NullSink, RecordingSink, RoundSink};
pub use stream::{
    ChunkBuffer, FenceDetector, FenceState, ResponseAssembler, StreamHandle, StreamManager,
    StreamOutcome,
};
pub use stream_event::AgentStreamEvent;
pub use tokio_util::sync::CancellationToken;
