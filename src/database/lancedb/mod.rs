// LanceDB vector database module
// Persists one vector per chunk and answers nearest-neighbour queries


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::TextChunk;

pub use vector_store::{SearchHit, VectorStore};

/// One stored row: a chunk's vector plus what is needed to show and trace it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// `{record_index}-{chunk_index}`
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// Metadata stored next to each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Insertion ordinal within the build; breaks distance ties
    pub entry_index: u32,
    /// Back-reference to the record in the dataset snapshot
    pub record_index: u32,
    /// Position of the chunk within its record
    pub chunk_index: u32,
    /// Chunk text handed to the prompt as context
    pub content: String,
    pub category: String,
    pub source: String,
    pub instruction: String,
    pub created_at: String,
}

impl IndexEntry {
    #[inline]
    pub fn entry_id(record_index: usize, chunk_index: usize) -> String {
        format!("{}-{}", record_index, chunk_index)
    }

    /// Pair a chunk with its vector; `instruction`, `category` and `source` come from the owning record
    #[inline]
    pub fn from_chunk(
        entry_index: u32,
        chunk: &TextChunk,
        vector: Vec<f32>,
        instruction: &str,
        category: &str,
        source: &str,
        created_at: &str,
    ) -> Self {
        Self {
            id: Self::entry_id(chunk.record_index, chunk.chunk_index),
            vector,
            metadata: EntryMetadata {
                entry_index,
                record_index: chunk.record_index as u32,
                chunk_index: chunk.chunk_index as u32,
                content: chunk.content.clone(),
                category: category.to_string(),
                source: source.to_string(),
                instruction: instruction.to_string(),
                created_at: created_at.to_string(),
            },
        }
    }
}
