//! # loomterm core
//!
//! Domain types, traits, and error definitions for the loomterm agent
//! terminal. This crate does no I/O: it defines the model that the stream
//! pipeline, the tools and the transports are written against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here (`Provider`, `Tool`). Implementations live in
//! their own crates, so tests can drive the agent loop with scripted
//! transports and in-memory tools.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod response;
pub mod schema;
pub mod segment;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role, Round, ToolResultEntry};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StopReason, StreamChunk, Usage};
pub use response::Response;
pub use schema::{FieldSpec, FieldType, InputSchema};
pub use segment::{Segment, SegmentKind};
pub use tool::{Tool, ToolCall, ToolDef, ToolRegistry, ToolStatus};
