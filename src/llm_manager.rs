use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AIProvidersConfig;
use crate::providers::{AnthropicProvider, OllamaProvider, OpenAIProvider, OpenRouterProvider};

/// A chat-capable model: rendered prompt in, response text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Model name of the provider.
    fn model_name(&self) -> &str {
        "Unknown"
    }

    /// Send a prompt to the model and return its reply.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Build the first enabled provider, checked in the order openai, anthropic,
/// openrouter, ollama.
pub fn model_from_config(config: &AIProvidersConfig) -> Result<Arc<dyn ChatModel>> {
    if let Some(cfg) = config.openai.as_ref().filter(|c| c.enabled) {
        let mut provider = OpenAIProvider::new(Some(cfg.model.clone()), cfg.temperature)?;
        if let Some(url) = &cfg.base_url {
            provider = provider.with_base_url(url.clone());
        }
        return Ok(Arc::new(provider));
    }
    if let Some(cfg) = config.anthropic.as_ref().filter(|c| c.enabled) {
        let mut provider = AnthropicProvider::new(Some(cfg.model.clone()), cfg.temperature)?;
        if let Some(max_tokens) = cfg.max_tokens {
            provider = provider.with_max_tokens(max_tokens);
        }
        return Ok(Arc::new(provider));
    }
    if let Some(cfg) = config.openrouter.as_ref().filter(|c| c.enabled) {
        let provider = OpenRouterProvider::new(Some(cfg.model.clone()), cfg.temperature)?;
        return Ok(Arc::new(provider));
    }
    if let Some(cfg) = config.ollama.as_ref().filter(|c| c.enabled) {
        let provider = OllamaProvider::new(
            Some(cfg.model.clone()),
            cfg.temperature,
            cfg.base_url.clone(),
            cfg.max_tokens,
        );
        return Ok(Arc::new(provider));
    }
    Err(anyhow!("No AI provider is enabled in the configuration"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn provider(enabled: bool, model: &str) -> Option<ProviderConfig> {
        Some(ProviderConfig {
            enabled,
            model: model.to_string(),
            temperature: None,
            base_url: None,
            max_tokens: None,
        })
    }

    #[test]
    fn test_first_enabled_provider_wins() {
        let config = AIProvidersConfig {
            openai: provider(false, "gpt-4.1"),
            anthropic: None,
            openrouter: None,
            ollama: provider(true, "llama3.1"),
        };
        let model = model_from_config(&config).unwrap();
        assert_eq!(model.name(), "Ollama");
        assert_eq!(model.model_name(), "llama3.1");
    }

    #[test]
    fn test_nothing_enabled() {
        let config = AIProvidersConfig {
            openai: provider(false, "gpt-4.1"),
            anthropic: None,
            openrouter: None,
            ollama: None,
        };
        let err = model_from_config(&config).err().unwrap();
        assert!(err.to_string().contains("No AI provider"));
    }
}
