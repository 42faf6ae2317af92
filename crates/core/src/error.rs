//! Error types for the loomterm domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Transport failures and tool failures live in separate enums because they
//! travel differently: a `ProviderError` ends the current round and is
//! surfaced on the `Response`, a `ToolError` is captured on the `ToolCall`
//! and handed back to the model as data.

use thiserror::Error;

/// The top-level error type for all loomterm operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Programmer misuse / malformed internal state ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Model transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Tool lookup, validation and execution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("invalid input for {tool_name}: {reason}")]
    SchemaViolation { tool_name: String, reason: String },

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("permission denied for {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool already registered: {0}")]
    DuplicateTool(String),
}

impl ToolError {
    /// Shorthand for the most common failure a tool body reports.
    pub fn failed(tool_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn unknown_tool_message_is_stable() {
        let err = ToolError::NotFound("frobnicate".into());
        assert_eq!(err.to_string(), "unknown tool: frobnicate");
    }

    #[test]
    fn failed_shorthand_keeps_reason() {
        let err = ToolError::failed("read_file", "No such file or directory");
        assert_eq!(err.to_string(), "read_file failed: No such file or directory");
    }
}
