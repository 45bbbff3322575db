use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

pub type Vector = Vec<f32>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Extracted text of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Documents with positional ids `doc-0000`, `doc-0001`, ...
    pub fn from_texts<I, S>(texts: I) -> Vec<Document>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document {
                id: DocumentId(format!("doc-{:04}", i)),
                text: text.into(),
            })
            .collect()
    }
}

/// SHA-256 over ids and texts, order-sensitive.
pub fn document_set_fingerprint(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.id.0.as_bytes());
        hasher.update([0u8]);
        hasher.update((doc.text.len() as u64).to_le_bytes());
        hasher.update(doc.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub Uuid);

impl ChunkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub source_document_id: DocumentId,
    /// Position of this chunk within its document, starting at 0
    pub sequence_index: usize,
    /// Character offset in the document where `text` begins
    pub start_offset: usize,
    /// Leading characters of `text` repeated from the previous chunk
    pub overlap_len: usize,
    /// Set when a single unsplittable unit exceeded the size limit
    pub oversized: bool,
}

impl Chunk {
    /// Text without the characters shared with the previous chunk.
    pub fn body(&self) -> &str {
        match self.text.char_indices().nth(self.overlap_len) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub vector: Vector,
}

impl IndexEntry {
    pub fn new(chunk_id: ChunkId, vector: Vector) -> Self {
        Self { chunk_id, vector }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Where a piece of answer context came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub sequence_index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerWithSources {
    pub text: String,
    /// Retrieved chunks in rank order
    pub source_chunk_ids: Vec<ChunkId>,
    pub sources: Vec<SourceRef>,
    /// Citation URLs or labels returned by the model, if any
    pub citations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_texts_assigns_positional_ids() {
        let docs = Document::from_texts(["a", "b"]);
        assert_eq!(docs[0].id.as_str(), "doc-0000");
        assert_eq!(docs[1].id.as_str(), "doc-0001");
    }

    #[test]
    fn document_id_conversions_agree() {
        let borrowed = DocumentId::from("notes.md");
        let owned = DocumentId::from("notes.md".to_string());
        assert_eq!(borrowed, owned);
        assert_eq!(Document::new("notes.md", "x").id, owned);
    }

    #[test]
    fn fingerprint_tracks_content_and_order() {
        let a = Document::from_texts(["one", "two"]);
        let b = Document::from_texts(["one", "two"]);
        let grown = Document::from_texts(["one", "two", "three"]);
        let edited = Document::from_texts(["one", "twO"]);

        assert_eq!(document_set_fingerprint(&a), document_set_fingerprint(&b));
        assert_ne!(document_set_fingerprint(&a), document_set_fingerprint(&grown));
        assert_ne!(document_set_fingerprint(&a), document_set_fingerprint(&edited));
    }

    #[test]
    fn chunk_body_skips_overlap_by_chars() {
        let chunk = Chunk {
            id: ChunkId::new(),
            text: "héllo world".to_string(),
            source_document_id: DocumentId::from("d"),
            sequence_index: 1,
            start_offset: 0,
            overlap_len: 2,
            oversized: false,
        };
        assert_eq!(chunk.body(), "llo world");
        assert_eq!(chunk.char_len(), 11);
    }
}
