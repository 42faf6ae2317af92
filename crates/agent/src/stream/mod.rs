//! Streaming segmentation: raw fragments in, ordered segments and tool
//! calls out.

pub mod buffer;
pub mod fence;
pub mod manager;
pub mod marker;

pub use buffer::ChunkBuffer;
pub use fence::{FenceDetector, FenceState};
pub use manager::{ResponseAssembler, StreamHandle, StreamManager, StreamOutcome};
pub use marker::{TOOL_CLOSE, TOOL_OPEN};
