//! Ollama embedding provider for locally served models

use crate::providers::{map_transport_error, EmbeddingProvider};
use async_trait::async_trait;
use chatdocs_core::{ChatDocsError, EmbeddingConfig, Result, ServiceErrorKind, Vector};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for Ollama embedding provider
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    pub model_name: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "nomic-embed-text".to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&EmbeddingConfig> for OllamaEmbeddingConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            model_name: config
                .model
                .clone()
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Ollama API request for embeddings
#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

/// Ollama API response for embeddings
#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbeddingProvider {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("ChatDocs/1.0")
            .build()
            .map_err(|e| ChatDocsError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    #[instrument(skip(self, texts), fields(count = texts.len(), model = %self.config.model_name))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OllamaEmbeddingRequest {
            model: &self.config.model_name,
            input: texts,
            truncate: true,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error("Ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatDocsError::EmbeddingService {
                kind: ServiceErrorKind::from_http_status(status.as_u16()),
                message: format!("Ollama API error {}: {}", status.as_u16(), body.trim()),
            });
        }

        let parsed: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            ChatDocsError::embedding_permanent(format!("Failed to parse Ollama response: {}", e))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(ChatDocsError::embedding_permanent(format!(
                "Ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }

        debug!("Ollama embeddings: {} vectors", parsed.embeddings.len());
        Ok(parsed.embeddings)
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn dimension(&self) -> Option<usize> {
        None
    }
}
