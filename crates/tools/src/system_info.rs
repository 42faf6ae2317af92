//! `system_info`: a plain-text description of the host.

use std::path::Path;

use async_trait::async_trait;
use loomterm_core::error::ToolError;
use loomterm_core::schema::{FieldType, InputSchema};
use loomterm_core::tool::Tool;
use serde_json::{Map, Value};
use sysinfo::{Disks, System};

/// Environment variables safe to show the model.
const SAFE_VARS: &[&str] = &[
    "HOME", "USER", "SHELL", "TERM", "PATH", "LANG", "EDITOR", "VIRTUAL_ENV",
];
const CATEGORIES: &[&str] = &["os", "env", "cwd", "disk"];

pub struct SystemInfoTool;

fn os_section() -> String {
    format!(
        "OS: {} {}\nKernel: {}\nArchitecture: {}",
        System::name().unwrap_or_else(|| std::env::consts::OS.into()),
        System::os_version().unwrap_or_default(),
        System::kernel_version().unwrap_or_else(|| "unknown".into()),
        std::env::consts::ARCH,
    )
}

fn env_section(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let lines: Vec<String> = SAFE_VARS
        .iter()
        .filter_map(|var| lookup(var).map(|val| format!("  {var}={val}")))
        .collect();
    (!lines.is_empty()).then(|| format!("Environment:\n{}", lines.join("\n")))
}

fn disk_section(cwd: &Path) -> Option<String> {
    const GB: f64 = (1u64 << 30) as f64;
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| cwd.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().components().count())?;
    let total = disk.total_space() as f64 / GB;
    let free = disk.available_space() as f64 / GB;
    Some(format!(
        "Disk usage ({}):\n  Total: {total:.1} GB\n  Used:  {:.1} GB\n  Free:  {free:.1} GB",
        disk.mount_point().display(),
        total - free,
    ))
}

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Get system information. Categories: os, env, cwd, disk."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().required(
            "categories",
            FieldType::Array,
            "Categories of system info to retrieve (os, env, cwd, disk).",
        )
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, ToolError> {
        let requested: Vec<&str> = input
            .get("categories")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if let Some(bad) = requested.iter().find(|c| !CATEGORIES.contains(*c)) {
            return Err(ToolError::InvalidArguments(format!(
                "unknown category '{bad}' (expected one of: {})",
                CATEGORIES.join(", ")
            )));
        }

        let cwd = std::env::current_dir().unwrap_or_default();
        let mut sections = Vec::new();
        // Fixed order regardless of request order.
        for category in CATEGORIES.iter().filter(|c| requested.contains(*c)) {
            let section = match *category {
                "os" => Some(os_section()),
                "cwd" => Some(format!("Working directory: {}", cwd.display())),
                "env" => env_section(|k| std::env::var(k).ok()),
                "disk" => disk_section(&cwd),
                _ => None,
            };
            sections.extend(section);
        }

        if sections.is_empty() {
            return Ok("No information categories specified.".into());
        }
        Ok(sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(input: Value) -> Result<String, ToolError> {
        SystemInfoTool.invoke(input.as_object().unwrap()).await
    }

    #[test]
    fn env_section_lists_only_safe_vars() {
        let section = env_section(|k| match k {
            "HOME" => Some("/home/me".into()),
            "EDITOR" => Some("vi".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(section, "Environment:\n  HOME=/home/me\n  EDITOR=vi");
        assert!(env_section(|_| None).is_none());
    }

    #[tokio::test]
    async fn cwd_and_os() {
        let out = run(json!({"categories": ["cwd", "os"]})).await.unwrap();
        assert!(out.starts_with("OS: "));
        assert!(out.contains("Architecture: "));
        assert!(out.contains("\n\nWorking directory: "));
    }

    #[tokio::test]
    async fn empty_categories() {
        let out = run(json!({"categories": []})).await.unwrap();
        assert_eq!(out, "No information categories specified.");
    }

    #[tokio::test]
    async fn unknown_category_rejected() {
        let err = run(json!({"categories": ["gpu"]})).await.unwrap_err();
        assert!(err.to_string().contains("unknown category 'gpu'"));
    }
}
