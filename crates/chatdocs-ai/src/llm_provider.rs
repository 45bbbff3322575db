use async_trait::async_trait;
use chatdocs_core::{LLMConfig, Result};
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature for sampling (0.0 to 2.0)
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            stop: None,
        }
    }
}

impl From<&LLMConfig> for GenerationConfig {
    fn from(config: &LLMConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop: None,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Response from the LLM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Generated text content
    pub content: String,
    /// Total tokens used in the request
    pub total_tokens: Option<usize>,
    /// Tokens used in the prompt
    pub prompt_tokens: Option<usize>,
    /// Tokens generated in the completion
    pub completion_tokens: Option<usize>,
    /// Finish reason (e.g., "stop", "length")
    pub finish_reason: Option<String>,
    /// Model used for generation
    pub model: String,
    /// Source URLs or labels attached by search-augmented models
    pub citations: Vec<String>,
}

/// One item of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Next piece of answer text
    Delta(String),
    /// Citation list; a later event replaces an earlier one
    Citations(Vec<String>),
}

pub type TokenStream = BoxStream<'static, Result<StreamEvent>>;

/// Replays a complete response as a stream.
pub fn response_stream(response: LLMResponse) -> TokenStream {
    let mut events = Vec::with_capacity(2);
    if !response.content.is_empty() {
        events.push(Ok(StreamEvent::Delta(response.content)));
    }
    if !response.citations.is_empty() {
        events.push(Ok(StreamEvent::Citations(response.citations)));
    }
    Box::pin(stream::iter(events))
}

/// Main trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a chat completion with message history
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LLMResponse>;

    /// Open a streamed completion. Errors before the first fragment are
    /// returned here; errors after it arrive through the stream.
    async fn stream_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<TokenStream> {
        let response = self.generate_chat(messages, config).await?;
        Ok(response_stream(response))
    }

    /// Get the name of this provider
    fn provider_name(&self) -> &str;

    /// Get the model identifier
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn response_stream_yields_text_then_citations() {
        let response = LLMResponse {
            content: "Paris".to_string(),
            citations: vec!["https://example.org/france".to_string()],
            ..LLMResponse::default()
        };
        let events: Vec<_> = response_stream(response)
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("Paris".to_string()),
                StreamEvent::Citations(vec!["https://example.org/france".to_string()]),
            ]
        );
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
