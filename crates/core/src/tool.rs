//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! read and write files, search, fetch web pages. The core only knows a
//! tool's name, its input schema, and how to invoke it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, ToolError};
use crate::schema::InputSchema;

/// Lifecycle of a tool call. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Allowed edges: Pending → Running, Running → terminal, and
    /// Pending → Failed for calls rejected before execution.
    pub fn can_advance_to(self, next: ToolStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model-requested invocation of a local tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within a turn
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Structured input payload
    pub input: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub status: ToolStatus,
}

impl ToolCall {
    /// A freshly detected call.
    pub fn pending(id: impl Into<String>, name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            output: None,
            error: None,
            status: ToolStatus::Pending,
        }
    }

    fn advance(&mut self, next: ToolStatus) -> crate::Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(Error::Internal(format!(
                "tool call {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> crate::Result<()> {
        self.advance(ToolStatus::Running)
    }

    pub fn succeed(&mut self, output: impl Into<String>) -> crate::Result<()> {
        self.advance(ToolStatus::Succeeded)?;
        self.output = Some(output.into());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> crate::Result<()> {
        self.advance(ToolStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Text handed back to the model: the output, or the error prefixed
    /// so the model can tell them apart.
    pub fn result_text(&self) -> String {
        match (&self.output, &self.error) {
            (Some(output), _) => output.clone(),
            (None, Some(error)) => format!("Error: {error}"),
            (None, None) => String::new(),
        }
    }
}

/// The core Tool trait.
///
/// Each built-in (read_file, write_file, grep, web_fetch, ...) implements
/// this trait and is registered once at startup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Declared input fields.
    fn input_schema(&self) -> InputSchema;

    /// Tools that change the environment run alone during dispatch.
    fn is_mutating(&self) -> bool {
        false
    }

    /// Run the tool. The input has already been validated against
    /// `input_schema`.
    async fn invoke(&self, input: &Map<String, Value>) -> std::result::Result<String, ToolError>;
}

/// A registered tool with its schema captured at registration time.
#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    pub mutating: bool,
    tool: Arc<dyn Tool>,
}

impl ToolDef {
    fn from_tool(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
            mutating: tool.is_mutating(),
            tool,
        }
    }

    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("mutating", &self.mutating)
            .finish()
    }
}

/// A registry of available tools.
///
/// Built once at startup and shared read-only (behind an `Arc`) afterwards.
/// Iteration is in name order so prompts and listings are deterministic.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDef>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        let def = ToolDef::from_tool(tool);
        if self.tools.contains_key(&def.name) {
            return Err(ToolError::DuplicateTool(def.name));
        }
        self.tools.insert(def.name.clone(), def);
        Ok(())
    }

    /// Get a tool by name.
    pub fn lookup(&self, name: &str) -> Option<&ToolDef> {
        self.tools.get(name)
    }

    /// All registered tools in name order.
    pub fn defs(&self) -> impl Iterator<Item = &ToolDef> {
        self.tools.values()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new().required("text", FieldType::String, "Text to echo")
        }
        async fn invoke(&self, input: &Map<String, Value>) -> std::result::Result<String, ToolError> {
            Ok(input["text"].as_str().unwrap_or_default().to_string())
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert!(registry.lookup("echo").is_some());
        assert!(registry.lookup("nonexistent").is_none());
        assert_eq!(registry.lookup("echo").unwrap().input_schema.fields().len(), 1);
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateTool(name) if name == "echo"));
    }

    #[tokio::test]
    async fn registered_tool_invokes() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let input = serde_json::json!({"text": "hello world"}).as_object().cloned().unwrap();
        let out = registry.lookup("echo").unwrap().tool().invoke(&input).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn status_moves_forward_only() {
        let mut call = ToolCall::pending("call_1", "echo", Map::new());
        call.start().unwrap();
        call.succeed("ok").unwrap();
        assert!(call.is_terminal());
        assert!(call.start().is_err());
        assert!(call.fail("late").is_err());
        assert_eq!(call.output.as_deref(), Some("ok"));
        assert!(call.error.is_none());
    }

    #[test]
    fn pending_may_fail_without_running() {
        let mut call = ToolCall::pending("call_1", "nope", Map::new());
        call.fail("unknown tool").unwrap();
        assert_eq!(call.status, ToolStatus::Failed);
        assert_eq!(call.result_text(), "Error: unknown tool");
    }

    #[test]
    fn pending_cannot_succeed_directly() {
        let mut call = ToolCall::pending("call_1", "echo", Map::new());
        assert!(call.succeed("skip").is_err());
        assert_eq!(call.status, ToolStatus::Pending);
    }
}
