use crate::chunk_store::ChunkStore;
use crate::index::{SearchHit, VectorIndex};
use chatdocs_core::{Chunk, Result, SourceRef};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl RetrievedChunk {
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            chunk_id: self.chunk.id,
            document_id: self.chunk.source_document_id.clone(),
            sequence_index: self.chunk.sequence_index,
            score: self.score,
        }
    }
}

/// Query-time access to indexed chunks.
pub trait Retriever: Send + Sync {
    /// Up to `k` chunks, best first. Chunks scoring below `min_score` are dropped.
    fn retrieve(&self, query: &[f32], k: usize, min_score: Option<f32>)
        -> Result<Vec<RetrievedChunk>>;
}

/// Retriever over an immutable [`VectorIndex`] and the chunks it was built from.
#[derive(Debug, Clone)]
pub struct IndexRetriever {
    index: Arc<VectorIndex>,
    store: Arc<ChunkStore>,
}

impl IndexRetriever {
    pub fn new(index: Arc<VectorIndex>, store: Arc<ChunkStore>) -> Self {
        Self { index, store }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Look hits up in the store; returns the chunks found and the number missing.
    fn resolve(&self, hits: Vec<SearchHit>) -> (Vec<RetrievedChunk>, usize) {
        let total = hits.len();
        let resolved: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                self.store.get(&hit.chunk_id).map(|chunk| RetrievedChunk {
                    chunk: chunk.clone(),
                    score: hit.score,
                })
            })
            .collect();
        let missing = total - resolved.len();
        (resolved, missing)
    }
}

/// Score descending, then sequence index, then document id.
fn rank(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        .then(a.chunk.source_document_id.cmp(&b.chunk.source_document_id))
}

impl Retriever for IndexRetriever {
    fn retrieve(
        &self,
        query: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>> {
        let k = k.min(self.index.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        // Widen the search until the k-th score is no longer tied with the next
        // hit and k resolvable chunks are in hand, so tie-breaking sees every
        // candidate at the boundary score.
        let mut fetch = k;
        let (mut results, missing) = loop {
            let hits = self.index.search(query, fetch)?;
            let last_score = hits.last().map(|h| h.score);
            let (resolved, missing) = self.resolve(hits);
            let short = resolved.len() < k;
            let at_edge = !short && last_score == Some(resolved[k - 1].score);
            if fetch < self.index.len() && (short || at_edge) {
                fetch = (fetch * 2).min(self.index.len());
                continue;
            }
            break (resolved, missing);
        };
        if missing > 0 {
            warn!("{} indexed chunks are missing from the store", missing);
        }

        results.sort_by(rank);
        if let Some(min) = min_score {
            results.retain(|r| r.score >= min);
        }
        results.truncate(k);

        debug!(
            "Retrieved {} chunks (k={}, fetched={}, min_score={:?})",
            results.len(),
            k,
            fetch,
            min_score
        );
        Ok(results)
    }
}
