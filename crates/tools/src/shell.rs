//! `shell`: run a command in the workspace root.
//!
//! The child is killed if the call is dropped, so the dispatcher's per-call
//! timeout also stops the process.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::str_arg;
use crate::web_fetch::truncate_chars;

const MAX_OUTPUT_CHARS: usize = 20_000;

pub struct ShellTool {
    workdir: PathBuf,
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
}

impl ShellTool {
    pub fn new(workdir: impl Into<PathBuf>, allowed_commands: Vec<String>) -> Self {
        Self {
            workdir: workdir.into(),
            allowed_commands,
        }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }
        let base = command.split_whitespace().next().unwrap_or_default();
        self.allowed_commands.iter().any(|a| a == base)
    }
}

fn command_for(line: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", line]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", line]);
        cmd
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return its stdout and stderr."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().required("command", FieldType::String, "The shell command to execute.")
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let command = str_arg(input, "command").unwrap_or_default().trim();
        if command.is_empty() {
            return Err(ToolError::InvalidArguments("command must not be empty".into()));
        }
        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: format!(
                    "command '{}' is not in the allowlist",
                    command.split_whitespace().next().unwrap_or_default()
                ),
            });
        }

        debug!(command, workdir = %self.workdir.display(), "Executing shell command");

        let output = command_for(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::failed("shell", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = if output.status.success() {
            if stderr.trim().is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let text = text.trim();
        if text.is_empty() {
            return Ok("(no output)".into());
        }
        Ok(truncate_chars(text.to_string(), MAX_OUTPUT_CHARS))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(tool: &ShellTool, command: &str) -> Result<String, ToolError> {
        let input = json!({ "command": command });
        tool.invoke(input.as_object().unwrap()).await
    }

    #[test]
    fn allowlist_matches_first_word() {
        let tool = ShellTool::new(".", vec!["ls".into(), "git".into()]);
        assert!(tool.is_command_allowed("ls -la"));
        assert!(tool.is_command_allowed("git status"));
        assert!(!tool.is_command_allowed("rm -rf /"));
        assert!(ShellTool::new(".", vec![]).is_command_allowed("anything goes"));
    }

    #[tokio::test]
    async fn runs_in_the_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello from disk\n").unwrap();
        let tool = ShellTool::new(dir.path(), vec![]);

        let out = run(&tool, "cat notes.txt").await.unwrap();
        assert_eq!(out, "hello from disk");

        run(&tool, "echo made > created.txt").await.unwrap();
        let created = std::fs::read_to_string(dir.path().join("created.txt")).unwrap();
        assert_eq!(created, "made\n");
    }

    #[tokio::test]
    async fn failure_reports_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(dir.path(), vec![]);

        let out = run(&tool, "echo oops >&2; exit 3").await.unwrap();
        assert!(out.starts_with("[exit code: 3]"), "{out}");
        assert!(out.contains("oops"));
    }

    #[tokio::test]
    async fn silent_success() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(dir.path(), vec![]);
        assert_eq!(run(&tool, "true").await.unwrap(), "(no output)");
    }

    #[tokio::test]
    async fn dropped_call_stops_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(dir.path(), vec![]);
        let started = std::time::Instant::now();

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(200), run(&tool, "sleep 5")).await;
        assert!(result.is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
    }

    #[tokio::test]
    async fn blocked_and_empty_commands() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(dir.path(), vec!["ls".into()]);

        let err = run(&tool, "rm -rf notes").await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
        let err = run(&tool, "   ").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
