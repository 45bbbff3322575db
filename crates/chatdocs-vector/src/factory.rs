use crate::hashing_provider::HashingEmbeddingProvider;
use crate::ollama_embedding_provider::{OllamaEmbeddingConfig, OllamaEmbeddingProvider};
use crate::openai_provider::{OpenAiConfig, OpenAiEmbeddingProvider};
use crate::providers::EmbeddingProvider;
use chatdocs_core::{ChatDocsError, EmbeddingConfig, Result};
use std::sync::Arc;
use tracing::info;

/// Build the embedding provider named by `config.provider`.
///
/// `auto` picks OpenAI when an API key is configured and falls back to the
/// offline hashing provider otherwise.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiEmbeddingProvider::new(OpenAiConfig::from(config))?),
        "ollama" => Arc::new(OllamaEmbeddingProvider::new(OllamaEmbeddingConfig::from(
            config,
        ))?),
        "hashing" => Arc::new(HashingEmbeddingProvider::new(config.dimension)),
        "auto" => {
            let has_key = config
                .openai_api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty());
            if has_key {
                Arc::new(OpenAiEmbeddingProvider::new(OpenAiConfig::from(config))?)
            } else {
                Arc::new(HashingEmbeddingProvider::new(config.dimension))
            }
        }
        other => {
            return Err(ChatDocsError::Configuration(format!(
                "Unknown embedding provider: {}. Must be one of: auto, openai, ollama, hashing",
                other
            )))
        }
    };

    info!("Embedding provider: {}", provider.provider_name());
    Ok(provider)
}
