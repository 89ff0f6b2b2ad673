//! Provider construction from configuration.

use autoapply_core::{Config, Error, Result};
use std::sync::Arc;

use crate::{OpenAIProvider, Provider};

/// Resolve the provider name: explicit config wins, then the model prefix,
/// then the OpenAI-compatible default.
pub fn resolve_provider_name(config: &Config) -> String {
    if let Some(name) = &config.agent.provider {
        return name.clone();
    }
    match config.agent.model.split('/').next() {
        Some(prefix) if config.providers.contains_key(prefix) => prefix.to_string(),
        _ => "openai".to_string(),
    }
}

/// Build the configured chat provider. Every configured endpoint speaks the
/// OpenAI chat-completions wire format; the provider entry supplies its key
/// and base URL.
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let name = resolve_provider_name(config);
    let provider_config = config.providers.get(&name).ok_or_else(|| {
        Error::Config(format!(
            "Provider '{}' is not configured; add it under providers in config.json",
            name
        ))
    })?;
    if provider_config.api_key.trim().is_empty() {
        return Err(Error::Config(format!("Provider '{}' has no apiKey", name)));
    }

    // Model ids may carry a provider prefix ("openai/gpt-4o-mini").
    let model = config
        .agent
        .model
        .strip_prefix(&format!("{}/", name))
        .unwrap_or(&config.agent.model);

    Ok(Arc::new(OpenAIProvider::new(
        &provider_config.api_key,
        provider_config.api_base.as_deref(),
        model,
        config.agent.max_tokens,
        config.agent.temperature,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoapply_core::config::ProviderConfig;

    #[test]
    fn test_resolve_explicit_provider() {
        let mut config = Config::default();
        config.agent.provider = Some("relay".to_string());
        assert_eq!(resolve_provider_name(&config), "relay");
    }

    #[test]
    fn test_resolve_from_model_prefix() {
        let mut config = Config::default();
        config.agent.model = "local/llama3".to_string();
        config.providers.insert("local".to_string(), ProviderConfig::default());
        assert_eq!(resolve_provider_name(&config), "local");
    }

    #[test]
    fn test_resolve_defaults_to_openai() {
        let config = Config::default();
        assert_eq!(resolve_provider_name(&config), "openai");
    }

    #[test]
    fn test_create_provider_requires_api_key() {
        let mut config = Config::default();
        config.providers.insert("openai".to_string(), ProviderConfig::default());
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_with_key() {
        let mut config = Config::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                api_key: "sk-test".to_string(),
                api_base: None,
            },
        );
        assert!(create_provider(&config).is_ok());
    }
}
