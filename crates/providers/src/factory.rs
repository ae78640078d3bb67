//! Provider construction from configuration.

use std::sync::Arc;

use scout_config::AppConfig;
use scout_core::error::ProviderError;
use scout_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured chat provider.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let name = config.provider.as_str();

    let base_url = match (&config.api_url, default_base_url(name)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' needs an api_url"
            )));
        }
    };

    if api_key.is_empty() && name != "ollama" {
        return Err(ProviderError::NotConfigured(format!(
            "no API key for provider '{name}' (set SCOUT_API_KEY or OPENAI_API_KEY)"
        )));
    }

    let provider = if name == "ollama" {
        OpenAiCompatProvider::ollama(Some(&base_url))
    } else {
        OpenAiCompatProvider::new(name, base_url, api_key)
    };
    Ok(Arc::new(provider))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}
