use crate::providers::{map_transport_error, EmbeddingProvider};
use async_trait::async_trait;
use chatdocs_core::{ChatDocsError, EmbeddingConfig, Result, ServiceErrorKind, Vector};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for OpenAI embedding provider
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: "text-embedding-3-small".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&EmbeddingConfig> for OpenAiConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            api_key: config.openai_api_key.clone().unwrap_or_default(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            api_base: config.openai_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// OpenAI API request structure for embeddings
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    encoding_format: &'static str,
}

/// OpenAI API response structure for embeddings
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

/// Error response from OpenAI API
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// OpenAI embedding provider implementation
pub struct OpenAiEmbeddingProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ChatDocsError::Configuration(
                "OpenAI API key is required. Set OPENAI_API_KEY environment variable.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("ChatDocs/1.0")
            .build()
            .map_err(|e| ChatDocsError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn known_dimension(&self) -> Option<usize> {
        match self.config.model.as_str() {
            "text-embedding-3-small" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            "text-embedding-ada-002" => Some(1536),
            _ => None,
        }
    }
}

/// Put vectors back into request order using the returned `index` field.
fn reorder(data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vector>> {
    if data.len() != expected {
        return Err(ChatDocsError::embedding_permanent(format!(
            "OpenAI returned {} embeddings for {} inputs",
            data.len(),
            expected
        )));
    }
    let mut slots: Vec<Option<Vector>> = vec![None; expected];
    for item in data {
        match slots.get_mut(item.index) {
            Some(slot) if slot.is_none() => *slot = Some(item.embedding),
            _ => {
                return Err(ChatDocsError::embedding_permanent(format!(
                    "OpenAI returned an invalid or duplicate embedding index {}",
                    item.index
                )))
            }
        }
    }
    slots
        .into_iter()
        .map(|v| v.ok_or_else(|| ChatDocsError::embedding_permanent("missing embedding index")))
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    #[instrument(skip(self, texts), fields(count = texts.len(), model = %self.config.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<ApiError>(&body) {
                Ok(api_error) => match api_error.error.error_type {
                    Some(kind) => format!("{} ({})", api_error.error.message, kind),
                    None => api_error.error.message,
                },
                Err(_) => format!("HTTP {}", status),
            };
            return Err(ChatDocsError::EmbeddingService {
                kind: ServiceErrorKind::from_http_status(status.as_u16()),
                message: format!("OpenAI API error {}: {}", status.as_u16(), detail),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            ChatDocsError::embedding_permanent(format!("Failed to parse OpenAI response: {}", e))
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "OpenAI embeddings: {} vectors, {} tokens",
                parsed.data.len(),
                usage.total_tokens
            );
        }

        reorder(parsed.data, texts.len())
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> Option<usize> {
        self.known_dimension()
    }
}
