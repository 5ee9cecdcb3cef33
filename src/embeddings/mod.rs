// Embeddings module
// Text chunking plus the Ollama client that turns chunks into vectors and prompts into answers

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{ChunkingConfig, TextChunk, chunk_record, estimate_token_count, split_text};
pub use ollama::{EmbeddingResult, OllamaClient};

/// Produces embedding vectors.
///
/// The index and every query must go through the same model; vectors from different
/// models are not comparable and mixing them degrades retrieval without any error.
pub trait Embedder: Send + Sync {
    /// Name of the embedding model, recorded in the build manifest
    fn model_name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Completes a prompt with a language model
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}
