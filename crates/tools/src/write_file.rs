//! `write_file`: create or overwrite a file, creating parent directories.

use async_trait::async_trait;
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use loomterm_security::PathPolicy;
use serde_json::{Map, Value};

use crate::{denied, str_arg};

pub struct WriteFileTool {
    policy: PathPolicy,
}

impl WriteFileTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write or create a file with the given content."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("path", FieldType::String, "Absolute or workspace-relative file path.")
            .required("content", FieldType::String, "Content to write to the file.")
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let raw = str_arg(input, "path").unwrap_or_default();
        let content = str_arg(input, "content").unwrap_or_default();
        let path = self.policy.resolve(raw).map_err(|e| denied(self.name(), e))?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "Writing file");

        let io_err = |e: std::io::Error| ToolError::failed("write_file", format!("{}: {e}", path.display()));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, content).await.map_err(io_err)?;

        Ok(format!("Wrote {} bytes to {}", content.len(), path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(PathPolicy::new(dir.path(), vec![]));
        let input = json!({"path": "a/b/out.txt", "content": "héllo"});

        let out = tool.invoke(input.as_object().unwrap()).await.unwrap();
        assert!(out.starts_with("Wrote 6 bytes to "));
        let written = std::fs::read_to_string(dir.path().join("a/b/out.txt")).unwrap();
        assert_eq!(written, "héllo");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "old contents").unwrap();
        let tool = WriteFileTool::new(PathPolicy::new(dir.path(), vec![]));

        tool.invoke(json!({"path": "f.txt", "content": "new"}).as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
    }

    #[test]
    fn is_mutating() {
        assert!(WriteFileTool::new(PathPolicy::new(".", vec![])).is_mutating());
    }
}
