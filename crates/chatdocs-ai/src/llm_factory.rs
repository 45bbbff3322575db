use crate::llm_provider::*;
use crate::openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use chatdocs_core::{ChatDocsError, LLMConfig, Result};
use std::sync::Arc;
use tracing::info;

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration
    pub fn create_from_config(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let provider_name = config.provider.to_lowercase();

        let provider = match provider_name.as_str() {
            "openai" => Self::create_openai_provider(config)?,
            "ollama" => Self::create_ollama_provider(config)?,
            "lmstudio" => Self::create_lmstudio_provider(config)?,
            "openai-compatible" => Self::create_openai_compatible_provider(config)?,
            _ => {
                return Err(ChatDocsError::Configuration(format!(
                    "Unsupported LLM provider: {}. Available providers: {}",
                    provider_name,
                    Self::supported_providers().join(", ")
                )))
            }
        };

        info!(
            "LLM provider: {} ({})",
            provider.provider_name(),
            provider.model_name()
        );
        Ok(provider)
    }

    /// Create a provider for the hosted OpenAI API
    fn create_openai_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config
            .openai_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ChatDocsError::Configuration(
                    "OpenAI API key not found. Set 'openai_api_key' in config \
                     or OPENAI_API_KEY environment variable"
                        .to_string(),
                )
            })?;

        let compat_config = OpenAICompatibleConfig {
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            ..OpenAICompatibleConfig::openai(config.model.clone(), api_key)
        };

        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }

    /// Create a provider using Ollama's OpenAI-compatible endpoint
    fn create_ollama_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let compat_config = OpenAICompatibleConfig {
            base_url: format!("{}/v1", config.ollama_url.trim_end_matches('/')),
            timeout_secs: config.timeout_secs,
            ..OpenAICompatibleConfig::ollama(config.model.clone())
        };

        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }

    /// Create a provider using LM Studio's OpenAI-compatible endpoint
    fn create_lmstudio_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let compat_config = OpenAICompatibleConfig {
            base_url: format!("{}/v1", config.lmstudio_url.trim_end_matches('/')),
            timeout_secs: config.timeout_secs,
            ..OpenAICompatibleConfig::lm_studio(config.model.clone())
        };

        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }

    /// Create an OpenAI-compatible provider
    fn create_openai_compatible_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let base_url = config.openai_compatible_url.clone().ok_or_else(|| {
            ChatDocsError::Configuration(
                "OpenAI-compatible base URL not found. Set 'openai_compatible_url' in config"
                    .to_string(),
            )
        })?;

        let compat_config = OpenAICompatibleConfig {
            timeout_secs: config.timeout_secs,
            api_key: config.openai_api_key.clone(),
            ..OpenAICompatibleConfig::custom(
                base_url,
                config.model.clone(),
                "openai-compatible".to_string(),
            )
        };

        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }

    /// Get a list of supported providers
    pub fn supported_providers() -> Vec<&'static str> {
        vec!["openai", "ollama", "lmstudio", "openai-compatible"]
    }
}
