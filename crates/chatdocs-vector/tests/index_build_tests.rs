use async_trait::async_trait;
use chatdocs_core::{ChatDocsError, Document, Result, RetryPolicy, Vector};
use chatdocs_vector::{
    BatchConfig, Chunker, ChunkerConfig, EmbeddingProvider, HashingEmbeddingProvider,
    IndexBuilder, Retriever,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        multiplier: 2.0,
    }
}

fn builder(embedder: Arc<dyn EmbeddingProvider>, max_size: usize, batch_size: usize) -> IndexBuilder {
    IndexBuilder::new(
        Chunker::new(ChunkerConfig::new(max_size, max_size / 5)).unwrap(),
        embedder,
        fast_retry(),
        BatchConfig {
            batch_size,
            max_concurrent: 3,
        },
    )
}

/// Fails permanently for any batch containing `poison`.
struct PoisonedEmbedder {
    inner: HashingEmbeddingProvider,
    poison: &'static str,
}

#[async_trait]
impl EmbeddingProvider for PoisonedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.iter().any(|t| t.contains(self.poison)) {
            return Err(ChatDocsError::embedding_permanent("malformed input"));
        }
        self.inner.embed(texts).await
    }

    fn provider_name(&self) -> &str {
        "poisoned"
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}

/// Transient failures for the first `failures` calls, then delegates.
struct FlakyEmbedder {
    inner: HashingEmbeddingProvider,
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(ChatDocsError::embedding_transient("rate limited"));
        }
        self.inner.embed(texts).await
    }

    fn provider_name(&self) -> &str {
        "flaky"
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}

/// Completes batches in reverse order of submission.
struct SlowFirstEmbedder {
    inner: HashingEmbeddingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for SlowFirstEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
        tokio::time::sleep(Duration::from_millis(30u64.saturating_sub(n * 10))).await;
        self.inner.embed(texts).await
    }

    fn provider_name(&self) -> &str {
        "slow-first"
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}

#[tokio::test]
async fn test_paris_document_is_retrieved() {
    let embedder = Arc::new(HashingEmbeddingProvider::default());
    let built = assert_ok!(
        builder(embedder.clone(), 1000, 16)
            .build(&Document::from_texts(["Paris is the capital of France."]))
            .await
    );
    assert_eq!(built.report.indexed_chunks, 1);

    let query = embedder.embed_one("What is the capital of France?").await.unwrap();
    let hits = built.retriever().retrieve(&query, 4, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.text.contains("Paris"));
}

#[tokio::test]
async fn test_empty_documents_fail_build() {
    let embedder = Arc::new(HashingEmbeddingProvider::default());
    let err = builder(embedder, 100, 4)
        .build(&Document::from_texts(["", ""]))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatDocsError::IndexBuild(_)));
}

#[tokio::test]
async fn test_whitespace_documents_fail_build() {
    let embedder = Arc::new(HashingEmbeddingProvider::default());
    let err = builder(embedder, 100, 4)
        .build(&Document::from_texts(["   ", "\n\t\n"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatDocsError::IndexBuild(_)));
}

#[tokio::test]
async fn test_whitespace_documents_are_not_indexed() {
    let embedder = Arc::new(HashingEmbeddingProvider::default());
    let built = builder(embedder, 1000, 4)
        .build(&Document::from_texts(["  \n ", "Paris is the capital of France."]))
        .await
        .unwrap();
    assert_eq!(built.report.documents, 2);
    assert_eq!(built.report.chunks, 1);
    assert!(built
        .store
        .iter()
        .all(|chunk| chunk.source_document_id.as_str() == "doc-0001"));
}

#[tokio::test]
async fn test_permanent_batch_failure_is_skipped() {
    let embedder = Arc::new(PoisonedEmbedder {
        inner: HashingEmbeddingProvider::new(64),
        poison: "POISON",
    });
    let docs = Document::from_texts([
        "Cats purr when they are content.",
        "POISON pills are dangerous.",
        "Dogs wag their tails.",
    ]);

    let built = builder(embedder, 1000, 1).build(&docs).await.unwrap();
    assert_eq!(built.report.chunks, 3);
    assert_eq!(built.report.indexed_chunks, 2);
    assert_eq!(built.report.skipped_batches.len(), 1);
    assert_eq!(built.report.skipped_batches[0].batch_index, 1);
    assert_eq!(built.store.len(), 2);
}

#[tokio::test]
async fn test_all_batches_skipped_fails_build() {
    let embedder = Arc::new(PoisonedEmbedder {
        inner: HashingEmbeddingProvider::new(64),
        poison: "",
    });
    let err = builder(embedder, 1000, 1)
        .build(&Document::from_texts(["anything"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatDocsError::IndexBuild(_)));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let embedder = Arc::new(FlakyEmbedder {
        inner: HashingEmbeddingProvider::new(64),
        failures: 2,
        calls: AtomicUsize::new(0),
    });
    let built = builder(embedder.clone(), 1000, 8)
        .build(&Document::from_texts(["retry me please"]))
        .await
        .unwrap();
    assert_eq!(built.report.indexed_chunks, 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_transient_failure_aborts_build() {
    let embedder = Arc::new(FlakyEmbedder {
        inner: HashingEmbeddingProvider::new(64),
        failures: usize::MAX,
        calls: AtomicUsize::new(0),
    });
    let err = builder(embedder, 1000, 8)
        .build(&Document::from_texts(["never works"]))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_out_of_order_batches_keep_chunk_association() {
    let embedder = Arc::new(SlowFirstEmbedder {
        inner: HashingEmbeddingProvider::default(),
        calls: AtomicUsize::new(0),
    });
    let docs = Document::from_texts([
        "astronomy telescopes galaxies",
        "cooking recipes kitchens",
        "football stadiums goals",
    ]);
    let built = builder(embedder, 1000, 1).build(&docs).await.unwrap();
    assert_eq!(built.report.indexed_chunks, 3);

    let hashing = HashingEmbeddingProvider::default();
    for doc in &docs {
        let query = hashing.embed_text(&doc.text);
        let hits = built.retriever().retrieve(&query, 1, None).unwrap();
        assert_eq!(hits[0].chunk.source_document_id, doc.id);
    }
}

#[tokio::test]
async fn test_oversized_chunks_are_reported() {
    let embedder = Arc::new(HashingEmbeddingProvider::new(32));
    let chunker = Chunker::new(ChunkerConfig::new(10, 2).separators([" "])).unwrap();
    let builder = IndexBuilder::new(chunker, embedder, fast_retry(), BatchConfig::default());
    let built = builder
        .build(&Document::from_texts(["tiny supercalifragilistic word"]))
        .await
        .unwrap();
    assert_eq!(built.report.oversized_chunks, 1);
    assert_eq!(built.report.dimension, 32);
}
