pub mod builder;
pub mod chunk_store;
pub mod chunker;
pub mod factory;
pub mod hashing_provider;
pub mod index;
pub mod ollama_embedding_provider;
pub mod openai_provider;
pub mod providers;
pub mod retriever;
pub mod similarity;

pub use builder::{BatchConfig, BuildReport, BuiltIndex, IndexBuilder, SkippedBatch};
pub use chunk_store::ChunkStore;
pub use chunker::{chunk_text, reconstruct, ChunkStats, Chunker, ChunkerConfig};
pub use factory::create_embedding_provider;
pub use hashing_provider::HashingEmbeddingProvider;
pub use index::{SearchHit, VectorIndex};
pub use ollama_embedding_provider::{OllamaEmbeddingConfig, OllamaEmbeddingProvider};
pub use openai_provider::{OpenAiConfig, OpenAiEmbeddingProvider};
pub use providers::EmbeddingProvider;
pub use retriever::{IndexRetriever, RetrievedChunk, Retriever};
pub use similarity::{cosine_similarity, normalize};
