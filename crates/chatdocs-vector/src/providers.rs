use async_trait::async_trait;
use chatdocs_core::{ChatDocsError, Result, Vector};

/// Unified trait for all embedding providers (local and remote)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input text, in input order. Makes a single attempt;
    /// callers own the retry policy.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Convenience wrapper for a single query text
    async fn embed_one(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(ChatDocsError::embedding_permanent(format!(
                "{} returned an unexpected number of vectors for one input",
                self.provider_name()
            ))),
        }
    }

    /// Get provider name for identification
    fn provider_name(&self) -> &str;

    /// Output dimension, when known before the first call
    fn dimension(&self) -> Option<usize>;
}

/// Network failures and timeouts are transient; anything else reqwest
/// reports (body decoding, redirects) is permanent.
pub(crate) fn map_transport_error(provider: &str, e: reqwest::Error) -> ChatDocsError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ChatDocsError::embedding_transient(format!("{} request failed: {}", provider, e))
    } else {
        ChatDocsError::embedding_permanent(format!("{} request failed: {}", provider, e))
    }
}
