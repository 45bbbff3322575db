use crate::providers::EmbeddingProvider;
use async_trait::async_trait;
use chatdocs_core::{Result, Vector};

/// Offline bag-of-words embeddings via feature hashing.
///
/// Deterministic and network-free, so it doubles as a test double. Texts that
/// share words land close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vector {
        let mut embedding = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = simple_hash(&token);
            let bucket = hash as usize % self.dimension;
            let sign = if (hash >> 31) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
            tokens += 1;
        }

        // Punctuation-only or empty text still needs a non-zero vector
        if tokens == 0 {
            let bucket = simple_hash(text.trim()) as usize % self.dimension;
            embedding[bucket] = 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        } else {
            // Every token cancelled out
            embedding[0] = 1.0;
        }
        embedding
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

fn simple_hash(text: &str) -> u32 {
    let mut hash = 5381u32;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u32);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[tokio::test]
    async fn embeds_in_order_with_fixed_dimension() {
        let provider = HashingEmbeddingProvider::new(64);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "".to_string()];
        let vectors = provider.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 64));
        assert_eq!(vectors[0], provider.embed_text("alpha"));
        assert!(vectors[2].iter().any(|x| *x != 0.0));
    }

    #[test]
    fn shared_words_score_higher() {
        let provider = HashingEmbeddingProvider::default();
        let question = provider.embed_text("What is the capital of France?");
        let relevant = provider.embed_text("Paris is the capital of France.");
        let unrelated = provider.embed_text("Bananas grow in tropical climates.");

        let close = cosine_similarity(&question, &relevant).unwrap();
        let far = cosine_similarity(&question, &unrelated).unwrap();
        assert!(close > far);
    }

    #[test]
    fn case_is_ignored() {
        let provider = HashingEmbeddingProvider::default();
        assert_eq!(provider.embed_text("France"), provider.embed_text("france"));
    }
}
