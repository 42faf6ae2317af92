//! `file_search`: glob over the workspace (`**` recurses).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use loomterm_security::PathPolicy;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::{denied, str_arg};

const MAX_RESULTS: usize = 100;

pub struct FileSearchTool {
    policy: PathPolicy,
}

impl FileSearchTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

/// `*` stays inside one path component, `**` crosses them.
pub(crate) fn path_glob(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Hidden entries below `base` are skipped, like shell globbing does.
pub(crate) fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn search(base: &Path, matcher: &GlobMatcher) -> Vec<PathBuf> {
    let mut matches: Vec<PathBuf> = WalkDir::new(base)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(Result::ok)
        .filter(|e| {
            e.path()
                .strip_prefix(base)
                .is_ok_and(|rel| matcher.is_match(rel))
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    matches.sort();
    matches
}

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Search for files matching a glob pattern."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("pattern", FieldType::String, "Glob pattern (supports ** for recursive).")
            .optional("path", FieldType::String, "Directory to search in (default: workspace root).")
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let pattern = str_arg(input, "pattern").unwrap_or_default().to_string();
        let base = self
            .policy
            .resolve(str_arg(input, "path").unwrap_or("."))
            .map_err(|e| denied(self.name(), e))?;
        let matcher = path_glob(&pattern)
            .map_err(|e| ToolError::failed(self.name(), format!("invalid glob pattern: {e}")))?;

        tracing::debug!(%pattern, base = %base.display(), "Searching files");

        let walk_base = base.clone();
        let matches = tokio::task::spawn_blocking(move || search(&walk_base, &matcher))
            .await
            .map_err(|e| ToolError::failed("file_search", e))?;

        if matches.is_empty() {
            return Ok(format!("No files matching '{pattern}' in {}", base.display()));
        }

        let mut out = matches
            .iter()
            .take(MAX_RESULTS)
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        if matches.len() > MAX_RESULTS {
            out.push_str(&format!("\n... and {} more", matches.len() - MAX_RESULTS));
        }
        Ok(out)
    }
}
