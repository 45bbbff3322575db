use crate::llm_provider::*;
use async_trait::async_trait;
use chatdocs_core::{ChatDocsError, Result, ServiceErrorKind};
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for OpenAI-compatible providers (OpenAI, LM Studio, Ollama, etc.)
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAICompatibleConfig {
    /// Base URL for the API (e.g., "http://localhost:1234/v1")
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Optional API key (some providers require it, some don't)
    pub api_key: Option<String>,
    /// Provider name for display purposes
    pub provider_name: String,
}

impl Default for OpenAICompatibleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "local-model".to_string(),
            timeout_secs: 120,
            api_key: None,
            provider_name: "openai-compatible".to_string(),
        }
    }
}

impl fmt::Debug for OpenAICompatibleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAICompatibleConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .finish()
    }
}

impl OpenAICompatibleConfig {
    /// Create config for the hosted OpenAI API
    pub fn openai(model: String, api_key: String) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model,
            api_key: Some(api_key),
            provider_name: "openai".to_string(),
            ..Default::default()
        }
    }

    /// Create config for LM Studio
    pub fn lm_studio(model: String) -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model,
            provider_name: "lmstudio".to_string(),
            ..Default::default()
        }
    }

    /// Create config for Ollama (OpenAI-compatible endpoint)
    pub fn ollama(model: String) -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model,
            provider_name: "ollama".to_string(),
            ..Default::default()
        }
    }

    /// Create config for custom endpoint
    pub fn custom(base_url: String, model: String, provider_name: String) -> Self {
        Self {
            base_url,
            model,
            provider_name,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    citations: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

/// One `data:` payload of a streamed completion
#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    #[serde(default)]
    citations: Option<Vec<String>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder for `text/event-stream` completion bodies.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
    citations: Option<Vec<String>>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.done {
                continue;
            }
            self.decode_line(&line, &mut events);
        }
        events
    }

    /// Flush a trailing line that had no newline.
    fn finish(&mut self) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() && !self.done {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut events);
        }
        self.done = true;
        events
    }

    fn decode_line(&mut self, line: &[u8], events: &mut Vec<Result<StreamEvent>>) {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim_end_matches(['\r', '\n']),
            Err(_) => {
                events.push(Err(ChatDocsError::llm_permanent(
                    "stream contained invalid UTF-8",
                )));
                self.done = true;
                return;
            }
        };
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == "[DONE]" {
            self.done = true;
            return;
        }

        match serde_json::from_str::<ChatStreamChunk>(payload) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    events.push(Err(ChatDocsError::llm_permanent(format!(
                        "stream error: {}",
                        error
                    ))));
                    self.done = true;
                    return;
                }
                for choice in chunk.choices {
                    if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                        events.push(Ok(StreamEvent::Delta(text)));
                    }
                }
                if let Some(citations) = chunk.citations {
                    if self.citations.as_ref() != Some(&citations) {
                        self.citations = Some(citations.clone());
                        events.push(Ok(StreamEvent::Citations(citations)));
                    }
                }
            }
            Err(e) => {
                events.push(Err(ChatDocsError::llm_permanent(format!(
                    "malformed stream chunk: {}",
                    e
                ))));
                self.done = true;
            }
        }
    }
}

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamEvent>>,
    failed: bool,
}

/// Turn a raw byte stream of server-sent events into completion events.
fn sse_events<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    let state = SseState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        failed: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.failed {
                return None;
            }
            if let Some(event) = state.pending.pop_front() {
                if event.is_err() {
                    state.failed = true;
                }
                return Some((event, state));
            }
            if state.decoder.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.failed = true;
                    let err = ChatDocsError::llm_transient(format!("stream interrupted: {}", e));
                    return Some((Err(err), state));
                }
                None => {
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    }))
}

fn map_transport_error(provider: &str, e: reqwest::Error) -> ChatDocsError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ChatDocsError::llm_transient(format!("{} request failed: {}", provider, e))
    } else {
        ChatDocsError::llm_permanent(format!("{} request failed: {}", provider, e))
    }
}

/// OpenAI-compatible LLM provider over the Chat Completions API
pub struct OpenAICompatibleProvider {
    config: OpenAICompatibleConfig,
    client: Client,
}

impl OpenAICompatibleProvider {
    /// Create a new OpenAI-compatible provider
    pub fn new(config: OpenAICompatibleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("ChatDocs/1.0")
            .build()
            .map_err(|e| ChatDocsError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create for LM Studio
    pub fn lm_studio(model: String) -> Result<Self> {
        Self::new(OpenAICompatibleConfig::lm_studio(model))
    }

    /// Create for Ollama
    pub fn ollama(model: String) -> Result<Self> {
        Self::new(OpenAICompatibleConfig::ollama(model))
    }

    /// Send one Chat Completions request and check the status.
    async fn send(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = ChatCompletionsRequest {
            model: &self.config.model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop: config.stop.as_deref(),
            stream,
        };

        let mut request_builder = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(api_key) = &self.config.api_key {
            request_builder =
                request_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| map_transport_error(&self.config.provider_name, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(ChatDocsError::LlmService {
                kind: ServiceErrorKind::from_http_status(status.as_u16()),
                message: format!(
                    "{} API error ({}): {}",
                    self.config.provider_name,
                    status,
                    error_text.trim()
                ),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    #[instrument(skip(self, messages, config), fields(provider = %self.config.provider_name, messages = messages.len()))]
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LLMResponse> {
        let response = self.send(messages, config, false).await?;
        let chat_response: ChatCompletionsResponse = response.json().await.map_err(|e| {
            ChatDocsError::llm_permanent(format!(
                "Failed to parse {} Chat Completions response: {}",
                self.config.provider_name, e
            ))
        })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatDocsError::llm_permanent("No choices in response"))?;

        debug!(
            "{} completion finished: {:?}",
            self.config.provider_name, choice.finish_reason
        );

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            total_tokens: chat_response.usage.as_ref().map(|u| u.total_tokens),
            prompt_tokens: chat_response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: chat_response.usage.as_ref().map(|u| u.completion_tokens),
            finish_reason: choice.finish_reason,
            model: chat_response
                .model
                .unwrap_or_else(|| self.config.model.clone()),
            citations: chat_response.citations.unwrap_or_default(),
        })
    }

    #[instrument(skip(self, messages, config), fields(provider = %self.config.provider_name, messages = messages.len()))]
    async fn stream_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<TokenStream> {
        let response = self.send(messages, config, true).await?;
        Ok(sse_events(response.bytes_stream().boxed()))
    }

    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
