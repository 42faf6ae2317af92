//! The assembled result of one model round.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::{StopReason, Usage};
use crate::tool::ToolCall;

/// Everything one streamed model response produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Full accumulated text exactly as streamed, tool blocks included
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    /// Transport failure that ended the stream early
    #[serde(skip)]
    pub error: Option<ProviderError>,

    /// Calls in the order their markers appeared
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Set when the agent loop stopped because the round budget ran out
    #[serde(default)]
    pub truncated: bool,
}

impl Response {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
