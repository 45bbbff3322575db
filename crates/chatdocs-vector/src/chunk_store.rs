use chatdocs_core::{Chunk, ChunkId};
use std::collections::HashMap;

/// Chunk bodies keyed by id, owned alongside the index built from them.
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkId, Chunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.id, chunk);
    }

    pub fn get(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }
}

impl FromIterator<Chunk> for ChunkStore {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        Self {
            chunks: iter.into_iter().map(|c| (c.id, c)).collect(),
        }
    }
}
