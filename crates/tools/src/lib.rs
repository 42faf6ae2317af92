//! Built-in tool implementations for loomterm.
//!
//! Tools give the agent the ability to interact with the world:
//! read and write files, run shell commands, search the workspace, fetch
//! and search the web, and describe the host system.

pub mod file_search;
pub mod grep;
pub mod read_file;
pub mod shell;
pub mod system_info;
pub mod web_fetch;
pub mod web_search;
pub mod write_file;

use std::sync::Arc;

use globset::{Glob, GlobSetBuilder};
use loomterm_config::ToolsConfig;
use loomterm_core::error::ToolError;
use loomterm_core::tool::{Tool, ToolRegistry};
use loomterm_security::PathPolicy;
use serde_json::{Map, Value};

pub use file_search::FileSearchTool;
pub use grep::GrepTool;
pub use read_file::ReadFileTool;
pub use shell::ShellTool;
pub use system_info::SystemInfoTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;
pub use write_file::WriteFileTool;

/// Create the registry of built-in tools whose names match any of
/// `config.enabled`.
///
/// Security defaults:
/// - File tools resolve relative paths against the workspace root
/// - Paths under `forbidden_paths` (~/.ssh, /etc, ...) are blocked
/// - `shell` runs in the workspace root, limited by `allowed_commands` when set
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let mut patterns = GlobSetBuilder::new();
    for pattern in &config.enabled {
        let glob = Glob::new(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("bad tool pattern '{pattern}': {e}")))?;
        patterns.add(glob);
    }
    let enabled = patterns
        .build()
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

    let policy = PathPolicy::new(
        config.resolved_workspace_root(),
        config.forbidden_paths.clone(),
    );
    let all: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ReadFileTool::new(policy.clone())),
        Arc::new(WriteFileTool::new(policy.clone())),
        Arc::new(FileSearchTool::new(policy.clone())),
        Arc::new(GrepTool::new(policy.clone())),
        Arc::new(ShellTool::new(policy.root(), config.allowed_commands.clone())),
        Arc::new(WebFetchTool::new(config.fetch_max_chars)),
        Arc::new(WebSearchTool::new()),
        Arc::new(SystemInfoTool),
    ];

    let mut registry = ToolRegistry::new();
    for tool in all {
        if enabled.is_match(tool.name()) {
            registry.register(tool)?;
        } else {
            tracing::debug!(tool = tool.name(), "Tool disabled by configuration");
        }
    }
    Ok(registry)
}

/// String field; the schema has already checked its type.
pub(crate) fn str_arg<'a>(input: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// Map a path-policy rejection to a tool error.
pub(crate) fn denied(tool_name: &str, err: loomterm_security::PathValidationError) -> ToolError {
    ToolError::PermissionDenied {
        tool_name: tool_name.into(),
        reason: err.to_string(),
    }
}
