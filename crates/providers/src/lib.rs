//! Model transports for loomterm.
//!
//! All providers implement the `loomterm_core::Provider` trait.
//! [`build_from_config`] picks one from the loaded configuration.

pub mod openai_compat;
pub mod scripted;

use std::sync::Arc;

use loomterm_config::AppConfig;
use loomterm_core::error::ProviderError;
use loomterm_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{Scenario, ScriptedProvider};

/// Build the configured provider.
///
/// Hosted providers need an API key; `ollama` and `scripted` do not.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = || {
        config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no API key for '{}' (set api_key or LOOMTERM_API_KEY)",
                config.provider
            ))
        })
    };

    let provider: Arc<dyn Provider> = match config.provider.as_str() {
        "openai" => {
            let key = api_key()?;
            match &config.base_url {
                Some(url) => Arc::new(OpenAiCompatProvider::new("openai", url, key)),
                None => Arc::new(OpenAiCompatProvider::openai(key)),
            }
        }
        "openrouter" => {
            let key = api_key()?;
            match &config.base_url {
                Some(url) => Arc::new(OpenAiCompatProvider::new("openrouter", url, key)),
                None => Arc::new(OpenAiCompatProvider::openrouter(key)),
            }
        }
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(config.base_url.as_deref())),
        "custom" => {
            let url = config.base_url.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("provider 'custom' requires base_url".into())
            })?;
            Arc::new(OpenAiCompatProvider::new(
                "custom",
                url,
                config.api_key.clone().unwrap_or_default(),
            ))
        }
        "scripted" => Arc::new(ScriptedProvider::demo()),
        other => {
            return Err(ProviderError::NotConfigured(format!("unknown provider '{other}'")));
        }
    };

    tracing::debug!(provider = provider.name(), model = %config.model, "Provider ready");
    Ok(provider)
}
