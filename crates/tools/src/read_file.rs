//! `read_file`: file contents as numbered lines.

use async_trait::async_trait;
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use loomterm_security::PathPolicy;
use serde_json::{Map, Value};

use crate::{denied, str_arg};

pub struct ReadFileTool {
    policy: PathPolicy,
}

impl ReadFileTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

/// Number lines from `offset + 1`, keeping their original endings.
fn number_lines(content: &str, offset: usize, limit: Option<usize>) -> String {
    let lines = content.split_inclusive('\n').skip(offset);
    let lines: Box<dyn Iterator<Item = &str>> = match limit {
        Some(n) => Box::new(lines.take(n)),
        None => Box::new(lines),
    };

    let numbered: String = lines
        .enumerate()
        .map(|(i, line)| format!("{:4} | {line}", offset + i + 1))
        .collect();
    if numbered.is_empty() {
        "(empty file)".into()
    } else {
        numbered
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Lines are numbered."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("path", FieldType::String, "Absolute or workspace-relative file path.")
            .optional("offset", FieldType::Integer, "Line number to start reading from (0-based).")
            .optional("limit", FieldType::Integer, "Maximum number of lines to read.")
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let raw = str_arg(input, "path").unwrap_or_default();
        let path = self.policy.resolve(raw).map_err(|e| denied(self.name(), e))?;
        let offset = input.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = input.get("limit").and_then(Value::as_u64).map(|n| n as usize);

        tracing::debug!(path = %path.display(), offset, ?limit, "Reading file");

        if !path.is_file() {
            return Err(ToolError::failed(
                self.name(),
                format!("file not found: {}", path.display()),
            ));
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("{}: {e}", path.display())))?;

        Ok(number_lines(&content, offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(root: &std::path::Path) -> ReadFileTool {
        ReadFileTool::new(PathPolicy::new(root, vec![]))
    }

    fn input(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn numbering_respects_offset_and_limit() {
        let text = "a\nb\nc\nd\n";
        assert_eq!(number_lines(text, 0, None), "   1 | a\n   2 | b\n   3 | c\n   4 | d\n");
        assert_eq!(number_lines(text, 1, Some(2)), "   2 | b\n   3 | c\n");
        assert_eq!(number_lines("", 0, None), "(empty file)");
        assert_eq!(number_lines("tail", 0, None), "   1 | tail");
    }

    #[tokio::test]
    async fn reads_relative_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Hello, world!\n").unwrap();

        let out = tool(dir.path())
            .invoke(&input(json!({"path": "notes.txt"})))
            .await
            .unwrap();
        assert_eq!(out, "   1 | Hello, world!\n");
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path())
            .invoke(&input(json!({"path": "nope.txt"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[tokio::test]
    async fn forbidden_path_blocked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("private")).unwrap();
        std::fs::write(dir.path().join("private/key"), "k").unwrap();
        let forbidden = vec![dir.path().join("private").to_string_lossy().into_owned()];
        let tool = ReadFileTool::new(PathPolicy::new(dir.path(), forbidden));

        let err = tool
            .invoke(&input(json!({"path": "private/key"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
