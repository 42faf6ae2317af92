//! `loomterm config` — show or initialise the configuration.

use std::path::Path;

use loomterm_config::AppConfig;

use super::{config_path, load_config};

pub fn show(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    let mut config = load_config(explicit)?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }

    println!("# {}", path.display());
    if !path.exists() {
        println!("# (file not found; showing defaults)");
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn init(explicit: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        init(Some(&path), false).unwrap();
        let written = AppConfig::load_from(&path).unwrap();
        assert_eq!(written.provider, "openrouter");

        assert!(init(Some(&path), false).is_err());
        assert!(init(Some(&path), true).is_ok());
    }
}
