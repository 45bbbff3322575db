use crate::similarity::{dot, normalize};
use chatdocs_core::{ChatDocsError, ChunkId, IndexEntry, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Exact cosine-similarity index over unit-normalized vectors.
///
/// Vectors are normalized on insertion, so a search is a brute-force inner
/// product scan. The first insertion fixes the dimension.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    ids: Vec<ChunkId>,
    /// Row-major, `ids.len() * dimension` values
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index that only accepts vectors of `dimension`.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add entries atomically: if any entry is rejected nothing is inserted.
    pub fn add(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        let dimension = self.dimension.unwrap_or(first.vector.len());
        if dimension == 0 {
            return Err(ChatDocsError::InvalidVector(
                "vectors must have at least one component".to_string(),
            ));
        }

        let mut normalized = Vec::with_capacity(entries.len() * dimension);
        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(ChatDocsError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
            normalized.extend(normalize(&entry.vector)?);
        }

        self.dimension = Some(dimension);
        self.ids.extend(entries.iter().map(|e| e.chunk_id));
        self.data.extend(normalized);
        debug!("Index holds {} vectors of dimension {}", self.ids.len(), dimension);
        Ok(())
    }

    /// Best-first hits for `query`. `k` is clamped to the index size and equal
    /// scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let dimension = match self.dimension {
            Some(d) if !self.is_empty() => d,
            _ => return Ok(Vec::new()),
        };
        if query.len() != dimension {
            return Err(ChatDocsError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = normalize(query)?;
        let mut scored: Vec<(usize, f32)> = self
            .data
            .par_chunks_exact(dimension)
            .enumerate()
            .map(|(row, vector)| (row, dot(vector, &query)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(row, score)| SearchHit {
                chunk_id: self.ids[row],
                score,
            })
            .collect())
    }
}
