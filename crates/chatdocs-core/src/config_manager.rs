use crate::error::ChatDocsError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ChatDocsError {
    fn from(err: ConfigError) -> Self {
        ChatDocsError::Configuration(err.to_string())
    }
}

/// Main configuration for ChatDocs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatDocsConfig {
    /// How documents are split before embedding
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Query-time retrieval and prompt settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat model configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Backoff applied to transient provider failures
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChatDocsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigManager::validate_config(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters, overlap included
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Split points in priority order; an empty string allows hard cuts
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks placed in the prompt
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Drop chunks scoring below this cosine similarity
    #[serde(default)]
    pub min_score: Option<f32>,

    /// Rewrite follow-up questions into standalone ones before retrieval
    #[serde(default)]
    pub condense_question: bool,

    /// Render only the most recent N turns into the prompt (None = all)
    #[serde(default)]
    pub history_window: Option<usize>,

    /// Instruction placed at the top of every answer prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
            condense_question: false,
            history_window: None,
            system_prompt: default_system_prompt(),
        }
    }
}

/// Embedding provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "openai", "ollama", "hashing", or "auto"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model identifier
    /// For OpenAI: defaults to "text-embedding-3-small"
    /// For Ollama: defaults to "nomic-embed-text"
    #[serde(default)]
    pub model: Option<String>,

    /// OpenAI API key (if using OpenAI)
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Ollama URL (if using Ollama)
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Vector width of the offline hashing provider
    #[serde(default = "default_hashing_dimension")]
    pub dimension: usize,

    /// Texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Embedding requests in flight during an index build
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            ollama_url: default_ollama_url(),
            dimension: default_hashing_dimension(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("ollama_url", &self.ollama_url)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Chat model configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// LLM provider: "openai", "ollama", "lmstudio", "openai-compatible"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<usize>,

    /// Stream answers fragment by fragment
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// OpenAI API key
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Ollama URL
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// LM Studio URL
    #[serde(default = "default_lmstudio_url")]
    pub lmstudio_url: String,

    /// OpenAI-compatible base URL (for custom endpoints)
    #[serde(default)]
    pub openai_compatible_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: None,
            streaming: default_streaming(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            ollama_url: default_ollama_url(),
            lmstudio_url: default_lmstudio_url(),
            openai_compatible_url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LLMConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("streaming", &self.streaming)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("ollama_url", &self.ollama_url)
            .field("lmstudio_url", &self.lmstudio_url)
            .field("openai_compatible_url", &self.openai_compatible_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level or filter directive, e.g. "info" or "chatdocs_ai=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

pub(crate) fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

// Default value functions
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ". ", " ", ""]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_top_k() -> usize {
    4
}
fn default_system_prompt() -> String {
    "You are a helpful assistant answering questions about the user's documents. \
     Answer using only the provided context. If the context does not contain the answer, \
     say that you don't know."
        .to_string()
}
fn default_embedding_provider() -> String {
    "auto".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_lmstudio_url() -> String {
    "http://localhost:1234".to_string()
}
fn default_hashing_dimension() -> usize {
    256
}
fn default_batch_size() -> usize {
    64
}
fn default_max_concurrent() -> usize {
    4
}
fn default_embedding_timeout_secs() -> u64 {
    60
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_streaming() -> bool {
    true
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered sources
pub struct ConfigManager {
    config: ChatDocsConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (./.chatdocs.toml, then ~/.chatdocs/config.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading ChatDocs configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: none (using defaults)"),
        }
        info!(
            "Embedding provider: {}, LLM: {} ({})",
            config.embedding.provider, config.llm.provider, config.llm.model
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load one specific file. Environment variables are not consulted.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already-built configuration after validating it.
    pub fn from_config(config: ChatDocsConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                debug!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".chatdocs.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .chatdocs.env: {}", e);
                } else {
                    debug!("Loaded .chatdocs.env from home directory");
                }
            }
        }
    }

    fn load_config_file() -> Result<(ChatDocsConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".chatdocs.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((ChatDocsConfig::default(), None))
    }

    /// ~/.chatdocs/config.toml
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".chatdocs").join("config.toml"))
    }

    fn read_toml_file(path: &Path) -> Result<ChatDocsConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: ChatDocsConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    fn apply_env_overrides(config: ChatDocsConfig) -> ChatDocsConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source. Unparsable numbers are ignored.
    pub fn apply_overrides<F>(mut config: ChatDocsConfig, lookup: F) -> ChatDocsConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        // Chunking and retrieval
        if let Some(size) = lookup("CHATDOCS_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            config.chunking.chunk_size = size;
        }
        if let Some(overlap) = lookup("CHATDOCS_CHUNK_OVERLAP").and_then(|v| v.parse().ok()) {
            config.chunking.chunk_overlap = overlap;
        }
        if let Some(k) = lookup("CHATDOCS_TOP_K").and_then(|v| v.parse().ok()) {
            config.retrieval.top_k = k;
        }

        // Embedding configuration
        if let Some(provider) = lookup("CHATDOCS_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Some(model) = lookup("CHATDOCS_EMBEDDING_MODEL") {
            config.embedding.model = Some(model);
        }
        if let Some(url) = lookup("CHATDOCS_OLLAMA_URL") {
            config.embedding.ollama_url = url.clone();
            config.llm.ollama_url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            config.embedding.openai_api_key = Some(key.clone());
            config.llm.openai_api_key = Some(key);
        }

        // LLM configuration
        if let Some(provider) = lookup("CHATDOCS_LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(model) = lookup("CHATDOCS_MODEL") {
            config.llm.model = model;
        }
        if let Some(t) = lookup("CHATDOCS_TEMPERATURE").and_then(|v| v.parse().ok()) {
            config.llm.temperature = t;
        }

        // Logging
        if let Some(level) = lookup("RUST_LOG") {
            config.logging.level = level;
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &ChatDocsConfig) -> Result<(), ConfigError> {
        let chunking = &config.chunking;
        if chunking.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if chunking.separators.is_empty() {
            return Err(ConfigError::ValidationError(
                "chunking.separators must not be empty".to_string(),
            ));
        }

        if config.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }
        if let Some(min) = config.retrieval.min_score {
            if !(-1.0..=1.0).contains(&min) {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.min_score must be within [-1, 1], got {}",
                    min
                )));
            }
        }

        match config.embedding.provider.as_str() {
            "auto" | "openai" | "ollama" | "hashing" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid embedding provider: {}. Must be one of: auto, openai, ollama, hashing",
                    other
                )))
            }
        }
        if config.embedding.batch_size == 0 || config.embedding.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size and embedding.max_concurrent must be greater than 0"
                    .to_string(),
            ));
        }
        if config.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }

        match config.llm.provider.as_str() {
            "openai" | "ollama" | "lmstudio" => {}
            "openai-compatible" => {
                if config.llm.openai_compatible_url.is_none() {
                    return Err(ConfigError::ValidationError(
                        "llm.openai_compatible_url is required for the openai-compatible provider"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid LLM provider: {}. Must be one of: openai, ollama, lmstudio, openai-compatible",
                    other
                )))
            }
        }
        if !(0.0..=2.0).contains(&config.llm.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "llm.temperature must be within [0, 2], got {}",
                config.llm.temperature
            )));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if config.retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }

        if tracing_subscriber::EnvFilter::try_new(&config.logging.level).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Use trace, debug, info, warn, error or a filter directive",
                config.logging.level
            )));
        }
        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ChatDocsConfig {
        &self.config
    }

    pub fn into_config(self) -> ChatDocsConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = ChatDocsConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ChatDocsConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.chunking.separators.last().map(String::as_str), Some(""));
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert!(config.llm.streaming);
        assert!(config.retrieval.history_window.is_none());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_config_validation() {
        let config = ChatDocsConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_config = config.clone();
        bad_config.embedding.provider = "invalid".to_string();
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config.clone();
        bad_config.chunking.chunk_size = 10;
        bad_config.chunking.chunk_overlap = 15;
        assert!(matches!(
            ConfigManager::validate_config(&bad_config),
            Err(ConfigError::ValidationError(_))
        ));

        let mut bad_config = config;
        bad_config.llm.provider = "openai-compatible".to_string();
        assert!(ConfigManager::validate_config(&bad_config).is_err());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CHATDOCS_CHUNK_SIZE", "500"),
            ("CHATDOCS_CHUNK_OVERLAP", "not-a-number"),
            ("CHATDOCS_TOP_K", "6"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CHATDOCS_MODEL", "gpt-4o-mini"),
        ]
        .into_iter()
        .collect();

        let config = ConfigManager::apply_overrides(ChatDocsConfig::default(), |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.embedding.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_api_keys_hidden_from_debug() {
        let mut config = ChatDocsConfig::default();
        config.embedding.openai_api_key = Some("sk-secret-value".to_string());
        config.llm.openai_api_key = Some("sk-secret-value".to_string());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: ChatDocsError = ConfigError::ValidationError("top_k".into()).into();
        assert!(matches!(err, ChatDocsError::Configuration(_)));
    }
}
