pub mod chat;
pub mod config_cmd;
pub mod tools;

use std::path::{Path, PathBuf};

use loomterm_config::AppConfig;

/// The config file in effect: `--config` or the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(AppConfig::config_path, Path::to_path_buf)
}

/// Load configuration with environment overrides applied.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}").into())
}
