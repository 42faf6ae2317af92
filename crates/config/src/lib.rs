//! Configuration loading, validation, and management for loomterm.
//!
//! Loads configuration from `~/.loomterm/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Providers `build_from_config` knows how to construct.
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "custom", "scripted"];

/// The root configuration structure.
///
/// Maps directly to `~/.loomterm/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model transport: one of [`KNOWN_PROVIDERS`]
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (falls back to environment variables)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Endpoint override; required for the `custom` provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model rounds per user turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Concurrent tool calls within one batch
    #[serde(default = "default_tool_fan_out")]
    pub tool_fan_out: usize,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Split prose at blank lines while streaming
    #[serde(default = "default_true")]
    pub paragraph_splits: bool,
}

fn default_max_rounds() -> usize {
    25
}
fn default_tool_fan_out() -> usize {
    4
}
fn default_tool_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tool_fan_out: default_tool_fan_out(),
            tool_timeout_secs: default_tool_timeout_secs(),
            system_prompt: None,
            paragraph_splits: true,
        }
    }
}

/// Built-in tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Glob patterns over tool names; a tool is registered if any matches
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,

    /// Root for relative paths given to file tools (defaults to the cwd)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Paths the file tools must never touch
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    /// Maximum characters `web_fetch` returns
    #[serde(default = "default_fetch_max_chars")]
    pub fetch_max_chars: usize,

    /// First words `shell` may run; empty allows any command
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

fn default_enabled() -> Vec<String> {
    vec!["*".into()]
}
fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/proc".into(),
        "/sys".into(),
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
    ]
}
fn default_fetch_max_chars() -> usize {
    20_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workspace_root: None,
            forbidden_paths: default_forbidden_paths(),
            fetch_max_chars: default_fetch_max_chars(),
            allowed_commands: Vec::new(),
        }
    }
}

impl ToolsConfig {
    /// The workspace root, falling back to the current directory.
    pub fn resolved_workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.loomterm/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `LOOMTERM_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("LOOMTERM_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("LOOMTERM_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("LOOMTERM_MODEL") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".loomterm")
    }

    /// Default location of `config.toml`.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider '{}' (expected one of: {})",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }
        if self.provider == "custom" && self.base_url.is_none() {
            return Err(ConfigError::ValidationError(
                "provider 'custom' requires base_url".into(),
            ));
        }
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError("agent.max_rounds must be > 0".into()));
        }
        if self.agent.tool_fan_out == 0 {
            return Err(ConfigError::ValidationError("agent.tool_fan_out must be > 0".into()));
        }
        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: None,
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Get the user's home directory.
pub fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
