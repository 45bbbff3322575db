use chatdocs_core::{Chunk, ChunkId, ChunkingConfig, ChatDocsError, Document, DocumentId, Result};
use rayon::prelude::*;

/// Configuration knobs for the recursive chunker.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters, overlap included
    pub max_size: usize,
    /// Characters carried over from the end of the previous chunk
    pub overlap: usize,
    /// Split points in priority order; "" permits hard cuts
    pub separators: Vec<String>,
}

impl ChunkerConfig {
    pub fn new(max_size: usize, overlap: usize) -> Self {
        Self {
            max_size,
            overlap,
            separators: ChunkingConfig::default().separators,
        }
    }

    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&ChunkingConfig> for ChunkerConfig {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            max_size: config.chunk_size,
            overlap: config.chunk_overlap,
            separators: config.separators.clone(),
        }
    }
}

/// Summary of a chunking pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStats {
    pub documents: usize,
    pub chunks: usize,
    pub oversized: usize,
    pub min_len: usize,
    pub max_len: usize,
    pub mean_len: f64,
}

impl ChunkStats {
    pub fn from_chunks(documents: usize, chunks: &[Chunk]) -> Self {
        if chunks.is_empty() {
            return Self {
                documents,
                ..Self::default()
            };
        }
        let lens: Vec<usize> = chunks.iter().map(Chunk::char_len).collect();
        Self {
            documents,
            chunks: chunks.len(),
            oversized: chunks.iter().filter(|c| c.oversized).count(),
            min_len: lens.iter().copied().min().unwrap_or(0),
            max_len: lens.iter().copied().max().unwrap_or(0),
            mean_len: lens.iter().sum::<usize>() as f64 / lens.len() as f64,
        }
    }
}

/// Byte range of one chunk body.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    oversized: bool,
}

/// Splits text on a priority list of separators, then packs neighbouring
/// pieces into bodies of at most `max_size - overlap` characters. Each chunk
/// is its body prefixed with the `overlap` characters that precede it.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        if config.max_size == 0 {
            return Err(ChatDocsError::Configuration(
                "chunk max size must be greater than 0".to_string(),
            ));
        }
        if config.overlap >= config.max_size {
            return Err(ChatDocsError::Configuration(format!(
                "chunk overlap ({}) must be smaller than max size ({})",
                config.overlap, config.max_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    fn body_budget(&self) -> usize {
        self.config.max_size - self.config.overlap
    }

    /// Chunk one document. Sequence indices start at 0.
    pub fn chunk(&self, document_id: &DocumentId, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        self.split_span(text, 0, text.len(), &self.config.separators, &mut pieces);

        let mut chunks = Vec::with_capacity(pieces.len());
        let mut char_pos = 0usize;
        for (sequence_index, piece) in pieces.into_iter().enumerate() {
            let overlap_len = self.config.overlap.min(char_pos);
            let text_start = back_chars(text, piece.start, overlap_len);
            let body_chars = text[piece.start..piece.end].chars().count();

            chunks.push(Chunk {
                id: ChunkId::new(),
                text: text[text_start..piece.end].to_string(),
                source_document_id: document_id.clone(),
                sequence_index,
                start_offset: char_pos - overlap_len,
                overlap_len,
                oversized: piece.oversized,
            });
            char_pos += body_chars;
        }
        chunks
    }

    /// Chunk every document independently; output keeps document order.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .par_iter()
            .map(|doc| self.chunk(&doc.id, &doc.text))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    fn split_span(
        &self,
        text: &str,
        start: usize,
        end: usize,
        separators: &[String],
        out: &mut Vec<Piece>,
    ) {
        let budget = self.body_budget();
        let span = &text[start..end];
        if span.chars().count() <= budget {
            out.push(Piece {
                start,
                end,
                oversized: false,
            });
            return;
        }

        let found = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || span.contains(sep.as_str()));

        let (idx, separator) = match found {
            Some(found) => found,
            None => {
                out.push(Piece {
                    start,
                    end,
                    oversized: true,
                });
                return;
            }
        };

        if separator.is_empty() {
            hard_cut(start, span, budget, out);
            return;
        }

        let rest = &separators[idx + 1..];
        let mut pending: Option<(usize, usize, usize)> = None;
        for (s, e) in split_keep_separator(span, separator) {
            let (s, e) = (start + s, start + e);
            let len = text[s..e].chars().count();

            if len > budget {
                if let Some((ps, pe, _)) = pending.take() {
                    out.push(Piece {
                        start: ps,
                        end: pe,
                        oversized: false,
                    });
                }
                self.split_span(text, s, e, rest, out);
                continue;
            }

            pending = match pending {
                Some((ps, _, plen)) if plen + len <= budget => Some((ps, e, plen + len)),
                Some((ps, pe, _)) => {
                    out.push(Piece {
                        start: ps,
                        end: pe,
                        oversized: false,
                    });
                    Some((s, e, len))
                }
                None => Some((s, e, len)),
            };
        }
        if let Some((ps, pe, _)) = pending {
            out.push(Piece {
                start: ps,
                end: pe,
                oversized: false,
            });
        }
    }
}

/// Chunk a single text with the default separators.
pub fn chunk_text(text: &str, max_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(ChunkerConfig::new(max_size, overlap))?;
    Ok(chunker.chunk(&DocumentId::new("inline"), text))
}

/// Join chunk bodies back into the source text.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::body).collect()
}

/// Byte ranges of `span` split after each occurrence of `separator`.
fn split_keep_separator(span: &str, separator: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut last = 0;
    for (pos, _) in span.match_indices(separator) {
        let end = pos + separator.len();
        ranges.push((last, end));
        last = end;
    }
    if last < span.len() {
        ranges.push((last, span.len()));
    }
    ranges
}

fn hard_cut(offset: usize, span: &str, budget: usize, out: &mut Vec<Piece>) {
    let mut piece_start = 0;
    let mut count = 0;
    for (byte, _) in span.char_indices() {
        if count == budget {
            out.push(Piece {
                start: offset + piece_start,
                end: offset + byte,
                oversized: false,
            });
            piece_start = byte;
            count = 0;
        }
        count += 1;
    }
    out.push(Piece {
        start: offset + piece_start,
        end: offset + span.len(),
        oversized: false,
    });
}

/// Byte index `n` characters before `byte` (clamped to 0).
fn back_chars(text: &str, byte: usize, n: usize) -> usize {
    if n == 0 {
        return byte;
    }
    text[..byte]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossless(text: &str, max: usize, overlap: usize) -> Vec<Chunk> {
        let chunks = chunk_text(text, max, overlap).unwrap();
        assert_eq!(reconstruct(&chunks), text);
        for chunk in &chunks {
            assert!(chunk.oversized || chunk.char_len() <= max, "{:?}", chunk);
        }
        chunks
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let err = chunk_text("anything at all", 10, 15).unwrap_err();
        assert!(matches!(err, ChatDocsError::Configuration(_)));
        assert!(Chunker::new(ChunkerConfig::new(10, 10)).is_err());
        assert!(Chunker::new(ChunkerConfig::new(0, 0)).is_err());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = lossless("Paris is the capital of France.", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].overlap_len, 0);
        assert_eq!(chunks[0].sequence_index, 0);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird one.";
        let chunks = lossless(text, 30, 5);
        assert_eq!(chunks[0].text, "First paragraph here.\n\n");
        assert!(chunks[1].body().starts_with("Second"));
        assert_eq!(chunks[1].overlap_len, 5);
        assert_eq!(&chunks[1].text[..5], "re.\n\n");
    }

    #[test]
    fn neighbours_share_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = lossless(text, 20, 6);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let prev = &pair[0];
            let next = &pair[1];
            let shared: String = next.text.chars().take(next.overlap_len).collect();
            assert!(prev.text.ends_with(&shared));
            assert_eq!(next.sequence_index, prev.sequence_index + 1);
        }
    }

    #[test]
    fn hard_cuts_long_words_when_allowed() {
        let text = "x".repeat(45);
        let chunks = lossless(&text, 10, 2);
        assert!(chunks.iter().all(|c| !c.oversized));
        assert!(chunks.iter().all(|c| c.char_len() <= 10));
    }

    #[test]
    fn long_word_is_oversized_without_hard_cut() {
        let text = format!("short {} tail", "y".repeat(40));
        let chunker = Chunker::new(ChunkerConfig::new(12, 2).separators(["\n\n", " "])).unwrap();
        let chunks = chunker.chunk(&DocumentId::new("d"), &text);
        assert_eq!(reconstruct(&chunks), text);
        let oversized: Vec<_> = chunks.iter().filter(|c| c.oversized).collect();
        assert_eq!(oversized.len(), 1);
        assert!(oversized[0].body().starts_with("yyyy"));
    }

    #[test]
    fn handles_multibyte_text() {
        let text = "héllo wörld ñandú café naïve résumé smörgåsbord crème brûlée";
        let chunks = lossless(text, 15, 4);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn start_offsets_point_into_source() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = lossless(text, 16, 3);
        let chars: Vec<char> = text.chars().collect();
        for chunk in &chunks {
            let expected: String = chars[chunk.start_offset..chunk.start_offset + chunk.char_len()]
                .iter()
                .collect();
            assert_eq!(chunk.text, expected);
        }
    }

    #[test]
    fn documents_are_chunked_independently() {
        let docs = Document::from_texts(["first document text", "second document text"]);
        let chunker = Chunker::new(ChunkerConfig::new(1000, 100)).unwrap();
        let chunks = chunker.chunk_documents(&docs);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_document_id, docs[0].id);
        assert_eq!(chunks[1].source_document_id, docs[1].id);
        assert_eq!(chunks[1].sequence_index, 0);
        assert_eq!(chunks[1].overlap_len, 0);
    }

    #[test]
    fn stats_count_oversized() {
        let chunks = lossless("a b c d e f g h", 4, 1);
        let stats = ChunkStats::from_chunks(1, &chunks);
        assert_eq!(stats.chunks, chunks.len());
        assert_eq!(stats.oversized, 0);
        assert!(stats.max_len <= 4);
    }
}
