//! Path validation: resolves tool-supplied paths against the workspace and
//! blocks forbidden locations (e.g., ~/.ssh, /etc).

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Where file tools may operate.
///
/// Relative paths resolve against `root`. `allowed_roots` is empty unless
/// the policy is confined, in which case every path must land under one.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    root: PathBuf,
    allowed_roots: Vec<PathBuf>,
    forbidden_paths: Vec<String>,
}

impl PathPolicy {
    pub fn new(root: impl Into<PathBuf>, forbidden_paths: Vec<String>) -> Self {
        Self {
            root: root.into(),
            allowed_roots: Vec::new(),
            forbidden_paths,
        }
    }

    /// Reject anything outside the workspace root.
    pub fn confined(mut self) -> Self {
        self.allowed_roots = vec![self.root.clone()];
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `raw` (absolute, `~`-prefixed, or workspace-relative) to a
    /// checked absolute path. The target need not exist yet.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathValidationError> {
        let expanded = PathBuf::from(expand_tilde(raw));
        let joined = if expanded.is_absolute() {
            expanded
        } else {
            self.root.join(expanded)
        };
        validate_path(&joined, &self.allowed_roots, &self.forbidden_paths).map_err(|e| match e {
            PathValidationError::PathTraversal { .. } => {
                PathValidationError::PathTraversal { path: raw.into() }
            }
            other => other,
        })
    }
}

/// Validate that an absolute path is safe to access.
///
/// Checks:
/// 1. `..` components never climb above the filesystem root
/// 2. Symlinks in the longest existing prefix are resolved
/// 3. Path is within allowed roots (if specified)
/// 4. Path is not under a forbidden path
///
/// Returns the resolved path on success.
pub fn validate_path(
    path: &Path,
    allowed_roots: &[PathBuf],
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let display = path.display().to_string();
    let normalized =
        normalize(path).ok_or_else(|| PathValidationError::PathTraversal { path: display.clone() })?;
    let resolved = resolve_existing_prefix(&normalized).map_err(|e| {
        PathValidationError::CanonicalizeFailed {
            path: display.clone(),
            reason: e.to_string(),
        }
    })?;

    for forbidden in forbidden_paths {
        let blocked = resolve_existing_prefix(Path::new(&expand_tilde(forbidden)))
            .unwrap_or_else(|_| PathBuf::from(expand_tilde(forbidden)));
        if resolved.starts_with(&blocked) {
            return Err(PathValidationError::ForbiddenPath {
                path: display,
                pattern: forbidden.clone(),
            });
        }
    }

    if !allowed_roots.is_empty() {
        let inside = allowed_roots.iter().any(|root| {
            let root = resolve_existing_prefix(root).unwrap_or_else(|_| root.clone());
            resolved.starts_with(root)
        });
        if !inside {
            return Err(PathValidationError::OutsideAllowedRoots { path: display });
        }
    }

    Ok(resolved)
}

/// Lexically fold `.` and `..`. `None` if `..` escapes the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Canonicalize the longest existing ancestor and re-append the rest, so
/// paths to files that will be created still have symlinks resolved.
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
    let mut resolved = existing.canonicalize()?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Ok(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Result<String, std::env::VarError> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
    }
}
