use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceErrorKind {
    /// Rate limits, timeouts, connection resets, 5xx responses
    Transient,
    /// Malformed input, auth failures, unparsable responses
    Permanent,
}

impl ServiceErrorKind {
    /// 408, 429 and 5xx are worth retrying; any other status is not.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            408 | 429 | 500..=599 => ServiceErrorKind::Transient,
            _ => ServiceErrorKind::Permanent,
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Transient => write!(f, "transient"),
            ServiceErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChatDocsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Embedding service error ({kind}): {message}")]
    EmbeddingService {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("LLM service error ({kind}): {message}")]
    LlmService {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("No documents have been indexed yet")]
    NotReady,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract text from {document}: {message}")]
    Extraction { document: String, message: String },

    #[error("Turn was cancelled")]
    Cancelled,

    #[error("Turn {generation} was superseded by a newer question")]
    StaleTurn { generation: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChatDocsError>;

impl ChatDocsError {
    pub fn embedding_transient(message: impl Into<String>) -> Self {
        ChatDocsError::EmbeddingService {
            kind: ServiceErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn embedding_permanent(message: impl Into<String>) -> Self {
        ChatDocsError::EmbeddingService {
            kind: ServiceErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn llm_transient(message: impl Into<String>) -> Self {
        ChatDocsError::LlmService {
            kind: ServiceErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn llm_permanent(message: impl Into<String>) -> Self {
        ChatDocsError::LlmService {
            kind: ServiceErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Only transient provider failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatDocsError::EmbeddingService {
                kind: ServiceErrorKind::Transient,
                ..
            } | ChatDocsError::LlmService {
                kind: ServiceErrorKind::Transient,
                ..
            }
        )
    }

    /// Errors the user can recover from without changing configuration.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChatDocsError::IndexBuild(_)
                | ChatDocsError::NotReady
                | ChatDocsError::UnsupportedFormat(_)
                | ChatDocsError::Extraction { .. }
                | ChatDocsError::Cancelled
                | ChatDocsError::StaleTurn { .. }
        ) || self.is_retryable()
    }

    /// Get error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            ChatDocsError::Configuration(_) => "CONFIGURATION",
            ChatDocsError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            ChatDocsError::InvalidVector(_) => "INVALID_VECTOR",
            ChatDocsError::EmbeddingService { .. } => "EMBEDDING_SERVICE",
            ChatDocsError::LlmService { .. } => "LLM_SERVICE",
            ChatDocsError::IndexBuild(_) => "INDEX_BUILD",
            ChatDocsError::NotReady => "NOT_READY",
            ChatDocsError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ChatDocsError::Extraction { .. } => "EXTRACTION",
            ChatDocsError::Cancelled => "CANCELLED",
            ChatDocsError::StaleTurn { .. } => "STALE_TURN",
            ChatDocsError::Io(_) => "IO_ERROR",
            ChatDocsError::Serialization(_) => "SERIALIZATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_service_errors_are_retryable() {
        assert!(ChatDocsError::embedding_transient("429").is_retryable());
        assert!(ChatDocsError::llm_transient("timeout").is_retryable());
        assert!(!ChatDocsError::embedding_permanent("bad input").is_retryable());
        assert!(!ChatDocsError::NotReady.is_retryable());
        assert!(!ChatDocsError::Configuration("overlap".into()).is_retryable());
    }

    #[test]
    fn configuration_errors_are_not_recoverable() {
        assert!(!ChatDocsError::Configuration("x".into()).is_recoverable());
        assert!(!ChatDocsError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_recoverable());
        assert!(ChatDocsError::NotReady.is_recoverable());
        assert!(ChatDocsError::IndexBuild("empty".into()).is_recoverable());
    }

    #[test]
    fn http_status_classification() {
        assert_eq!(ServiceErrorKind::from_http_status(429), ServiceErrorKind::Transient);
        assert_eq!(ServiceErrorKind::from_http_status(408), ServiceErrorKind::Transient);
        assert_eq!(ServiceErrorKind::from_http_status(503), ServiceErrorKind::Transient);
        assert_eq!(ServiceErrorKind::from_http_status(400), ServiceErrorKind::Permanent);
        assert_eq!(ServiceErrorKind::from_http_status(401), ServiceErrorKind::Permanent);
    }

    #[test]
    fn display_includes_kind() {
        let err = ChatDocsError::embedding_transient("rate limited");
        assert_eq!(
            err.to_string(),
            "Embedding service error (transient): rate limited"
        );
        assert_eq!(err.error_code(), "EMBEDDING_SERVICE");
    }
}
