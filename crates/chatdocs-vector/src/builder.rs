use crate::chunk_store::ChunkStore;
use crate::chunker::{Chunker, ChunkerConfig};
use crate::index::VectorIndex;
use crate::providers::EmbeddingProvider;
use crate::retriever::IndexRetriever;
use crate::similarity::normalize;
use chatdocs_core::{
    ChatDocsConfig, ChatDocsError, Chunk, ChunkId, Document, IndexEntry, Result, RetryPolicy,
    Vector,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Configuration for embedding batch operations
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_concurrent: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedBatch {
    pub batch_index: usize,
    pub chunk_ids: Vec<ChunkId>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub indexed_chunks: usize,
    pub skipped_batches: Vec<SkippedBatch>,
    pub oversized_chunks: usize,
    pub dimension: usize,
    pub elapsed_ms: u64,
}

/// An immutable index together with the chunks it was built from.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: Arc<VectorIndex>,
    pub store: Arc<ChunkStore>,
    pub report: BuildReport,
}

impl BuiltIndex {
    pub fn retriever(&self) -> IndexRetriever {
        IndexRetriever::new(Arc::clone(&self.index), Arc::clone(&self.store))
    }
}

/// Chunk, embed and index a document set.
pub struct IndexBuilder {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    batch: BatchConfig,
}

enum BatchOutcome {
    Embedded(Vec<(ChunkId, Vector)>),
    Skipped(SkippedBatch),
}

impl IndexBuilder {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        batch: BatchConfig,
    ) -> Self {
        Self {
            chunker,
            embedder,
            retry,
            batch: BatchConfig {
                batch_size: batch.batch_size.max(1),
                max_concurrent: batch.max_concurrent.max(1),
            },
        }
    }

    /// Validates the chunking settings before anything else happens.
    pub fn from_config(config: &ChatDocsConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let chunker = Chunker::new(ChunkerConfig::from(&config.chunking))?;
        Ok(Self::new(
            chunker,
            embedder,
            config.retry.clone(),
            BatchConfig {
                batch_size: config.embedding.batch_size,
                max_concurrent: config.embedding.max_concurrent,
            },
        ))
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn build(&self, documents: &[Document]) -> Result<BuiltIndex> {
        let started = Instant::now();
        let blank = documents
            .iter()
            .filter(|d| d.text.trim().is_empty())
            .count();
        let chunks = if blank == 0 {
            self.chunker.chunk_documents(documents)
        } else {
            debug!("Ignoring {} documents without text content", blank);
            let with_text: Vec<Document> = documents
                .iter()
                .filter(|d| !d.text.trim().is_empty())
                .cloned()
                .collect();
            self.chunker.chunk_documents(&with_text)
        };
        if chunks.is_empty() {
            return Err(ChatDocsError::IndexBuild(
                "the document set has no text content to index".to_string(),
            ));
        }
        let total_chunks = chunks.len();
        let oversized_chunks = chunks.iter().filter(|c| c.oversized).count();
        info!(
            "Chunked {} documents into {} chunks ({} oversized)",
            documents.len(),
            chunks.len(),
            oversized_chunks
        );

        let batches: Vec<&[Chunk]> = chunks.chunks(self.batch.batch_size).collect();
        let batch_count = batches.len();
        let mut results = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_index, batch)| self.embed_batch(batch_index, batch))
            .buffer_unordered(self.batch.max_concurrent);

        // Completion order is arbitrary; slots restore submission order.
        let mut embedded: Vec<Option<Vec<(ChunkId, Vector)>>> = vec![None; batch_count];
        let mut skipped_batches = Vec::new();
        while let Some(outcome) = results.next().await {
            match outcome? {
                (batch_index, BatchOutcome::Embedded(pairs)) => embedded[batch_index] = Some(pairs),
                (_, BatchOutcome::Skipped(skipped)) => skipped_batches.push(skipped),
            }
        }
        drop(results);
        skipped_batches.sort_by_key(|s| s.batch_index);

        let mut index = VectorIndex::new();
        for pairs in embedded.into_iter().flatten() {
            let entries = pairs
                .into_iter()
                .map(|(chunk_id, vector)| IndexEntry::new(chunk_id, vector))
                .collect();
            index.add(entries)?;
        }

        if index.is_empty() {
            return Err(ChatDocsError::IndexBuild(format!(
                "all {} embedding batches failed",
                batch_count
            )));
        }

        let skipped_ids: std::collections::HashSet<ChunkId> = skipped_batches
            .iter()
            .flat_map(|s| s.chunk_ids.iter().copied())
            .collect();
        let store: ChunkStore = chunks
            .into_iter()
            .filter(|c| !skipped_ids.contains(&c.id))
            .collect();

        let report = BuildReport {
            documents: documents.len(),
            chunks: total_chunks,
            indexed_chunks: index.len(),
            skipped_batches,
            oversized_chunks,
            dimension: index.dimension().unwrap_or(0),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Index built: {} of {} chunks, dimension {}, {} skipped batches, {}ms",
            report.indexed_chunks,
            report.chunks,
            report.dimension,
            report.skipped_batches.len(),
            report.elapsed_ms
        );

        Ok(BuiltIndex {
            index: Arc::new(index),
            store: Arc::new(store),
            report,
        })
    }

    /// Permanent failures skip the batch; exhausted transient failures are returned.
    async fn embed_batch(
        &self,
        batch_index: usize,
        batch: &[Chunk],
    ) -> Result<(usize, BatchOutcome)> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let chunk_ids: Vec<ChunkId> = batch.iter().map(|c| c.id).collect();
        debug!("Embedding batch {} ({} chunks)", batch_index, texts.len());

        let texts = &texts;
        let op = format!("embedding batch {}", batch_index);
        let result = self.retry.run(&op, || self.embedder.embed(texts)).await;

        let reason = match result {
            Ok(vectors) if vectors.len() == chunk_ids.len() => {
                if let Some(bad) = vectors.iter().position(|v| normalize(v).is_err()) {
                    format!("vector {} is empty, zero or not finite", bad)
                } else {
                    let pairs = chunk_ids.into_iter().zip(vectors).collect();
                    return Ok((batch_index, BatchOutcome::Embedded(pairs)));
                }
            }
            Ok(vectors) => format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                chunk_ids.len()
            ),
            Err(err) if err.is_retryable() => return Err(err),
            Err(err) => err.to_string(),
        };

        warn!("Skipping embedding batch {}: {}", batch_index, reason);
        Ok((
            batch_index,
            BatchOutcome::Skipped(SkippedBatch {
                batch_index,
                chunk_ids,
                reason,
            }),
        ))
    }
}
