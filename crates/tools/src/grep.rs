//! `grep`: regex search across workspace files.

use std::fmt::Write as _;
use std::path::Path;

use async_trait::async_trait;
use globset::GlobMatcher;
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use loomterm_security::PathPolicy;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::file_search::{is_hidden, path_glob};
use crate::{denied, str_arg};

const MAX_FILES: usize = 50;
const MAX_LINES: usize = 200;

pub struct GrepTool {
    policy: PathPolicy,
}

impl GrepTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

struct Report {
    lines: Vec<String>,
    files: usize,
    capped: bool,
}

fn search_file(path: &Path, regex: &Regex) -> Vec<String> {
    let Ok(bytes) = std::fs::read(path) else {
        return Vec::new();
    };
    if bytes.contains(&0) {
        return Vec::new();
    }
    String::from_utf8_lossy(&bytes)
        .lines()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .map(|(i, line)| format!("  {}: {line}", i + 1))
        .collect()
}

fn search(base: &Path, regex: &Regex, filter: &GlobMatcher) -> Report {
    let mut report = Report {
        lines: Vec::new(),
        files: 0,
        capped: false,
    };

    let walker = WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file());

    for entry in walker {
        let rel = entry.path().strip_prefix(base).unwrap_or(entry.path());
        let shown = if rel.as_os_str().is_empty() {
            Path::new(entry.file_name())
        } else {
            rel
        };
        if !filter.is_match(shown) {
            continue;
        }
        let hits = search_file(entry.path(), regex);
        if hits.is_empty() {
            continue;
        }
        if report.files == MAX_FILES {
            report.capped = true;
            break;
        }

        report.files += 1;
        report.lines.push(format!("{}:", shown.display()));
        report.lines.extend(hits);
        if report.lines.len() >= MAX_LINES {
            report.lines.truncate(MAX_LINES);
            report.capped = true;
            break;
        }
    }
    report
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a regular expression. Prints matching lines with line numbers, grouped by file."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("pattern", FieldType::String, "Regular expression to search for.")
            .optional("path", FieldType::String, "File or directory to search (default: workspace root).")
            .optional("file_filter", FieldType::String, "Glob applied to file paths, e.g. *.rs (default: *).")
            .optional("case_sensitive", FieldType::Boolean, "Match case (default: true).")
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let pattern = str_arg(input, "pattern").unwrap_or_default().to_string();
        let base = self
            .policy
            .resolve(str_arg(input, "path").unwrap_or("."))
            .map_err(|e| denied(self.name(), e))?;
        let file_filter = str_arg(input, "file_filter").unwrap_or("*");
        let case_sensitive = input
            .get("case_sensitive")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| ToolError::failed(self.name(), format!("invalid regex pattern: {e}")))?;
        let filter = path_glob(&format!("**/{file_filter}"))
            .map_err(|e| ToolError::failed(self.name(), format!("invalid file filter: {e}")))?;

        tracing::debug!(%pattern, base = %base.display(), file_filter, case_sensitive, "Grep");

        let walk_base = base.clone();
        let report = tokio::task::spawn_blocking(move || search(&walk_base, &regex, &filter))
            .await
            .map_err(|e| ToolError::failed("grep", e))?;

        if report.lines.is_empty() {
            return Ok(format!("No matches found for '{pattern}' in {}", base.display()));
        }

        let mut out = report.lines.join("\n");
        if report.capped {
            let _ = write!(
                out,
                "\n... (results capped at {MAX_FILES} files / {MAX_LINES} lines)"
            );
        }
        Ok(out)
    }
}
