// Indexer module
// Turns the dataset into a persisted vector index and checks whether that index is still current

#[cfg(test)]
mod tests;

pub mod consistency;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::lancedb::{IndexEntry, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{IndexManifest, StoredRecord};
use crate::dataset::{Dataset, load_dataset};
use crate::embeddings::Embedder;
use crate::embeddings::chunking::{TextChunk, chunk_record};
use crate::{RagError, Result};

pub use consistency::{ConsistencyChecker, ConsistencyIssue, ConsistencyReport};

/// Entries written to LanceDB per insert
const STORE_BATCH_SIZE: usize = 1024;

/// Builds the vector index from a dataset file
pub struct IndexBuilder {
    config: Config,
    embedder: Arc<dyn Embedder>,
}

/// Outcome of a completed build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub build_id: String,
    pub records: usize,
    pub entries: usize,
    /// Records that were split into more than one entry
    pub chunked_records: usize,
    /// Dataset entries dropped under `dataset.skip_invalid`
    pub skipped: usize,
    pub dataset_hash: String,
    pub elapsed: Duration,
}

impl BuildReport {
    #[inline]
    pub fn summary(&self) -> String {
        format!(
            "Indexed {} records as {} entries ({} split into several chunks, {} skipped) in {:.1}s",
            self.records,
            self.entries,
            self.chunked_records,
            self.skipped,
            self.elapsed.as_secs_f64()
        )
    }
}

impl IndexBuilder {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self { config, embedder }
    }

    /// Build the index for the dataset at `dataset_path`, replacing any previous index.
    ///
    /// Every vector is computed before anything on disk is touched, so a build that
    /// fails while embedding leaves the previous index usable. Once writing starts the
    /// previous manifest is removed first; a build interrupted after that point leaves
    /// an index that reads as unbuilt.
    #[inline]
    pub async fn build(&self, dataset_path: &Path) -> Result<BuildReport> {
        let started = Instant::now();
        let build_id = Uuid::new_v4().to_string();
        info!("Starting index build {} from {}", build_id, dataset_path.display());

        let dataset = load_dataset(dataset_path, self.config.dataset.skip_invalid)?;
        if dataset.is_empty() {
            return Err(RagError::Dataset("dataset contains no records".to_string()));
        }

        let chunks_per_record: Vec<Vec<TextChunk>> = dataset
            .records
            .iter()
            .map(|record| chunk_record(record, &self.config.chunking))
            .collect();
        let chunks: Vec<&TextChunk> = chunks_per_record.iter().flatten().collect();
        let chunked_records = chunks_per_record.iter().filter(|c| c.len() > 1).count();

        debug!(
            "Split {} records into {} chunks ({} records split)",
            dataset.len(),
            chunks.len(),
            chunked_records
        );

        let vectors = self.embed_chunks(&chunks)?;
        let entries = self.create_entries(&dataset, &chunks, vectors);

        // The old manifest must not outlive its vectors; until the new snapshot is
        // committed the index reads as unbuilt
        let database = Database::new(self.config.database_path())
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;
        database
            .invalidate_manifest()
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        let dimension = self.config.ollama.embedding_dimension as usize;
        let vector_store = VectorStore::open(&self.config.vector_database_path()).await?;
        vector_store.reset(dimension).await?;
        for batch in entries.chunks(STORE_BATCH_SIZE) {
            vector_store.store_entries(batch).await?;
        }

        let stored_records: Vec<StoredRecord> = dataset
            .records
            .iter()
            .zip(&chunks_per_record)
            .map(|(record, chunks)| StoredRecord::from_record(record, chunks.len()))
            .collect();

        let manifest = IndexManifest {
            build_id: build_id.clone(),
            dataset_path: std::path::absolute(dataset_path)
                .unwrap_or_else(|_| dataset_path.to_path_buf())
                .display()
                .to_string(),
            dataset_hash: dataset.content_hash.clone(),
            record_count: dataset.len() as i64,
            entry_count: entries.len() as i64,
            embedding_model: self.embedder.model_name().to_string(),
            embedding_dimension: dimension as i64,
            chunk_size: self.config.chunking.chunk_size as i64,
            chunk_overlap: self.config.chunking.chunk_overlap as i64,
            config_fingerprint: self.config.fingerprint(),
            built_at: Utc::now().naive_utc(),
        };

        database
            .replace_snapshot(&stored_records, &manifest)
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        match vector_store
            .create_vector_index(self.config.index.ann_min_entries)
            .await
        {
            Ok(true) => info!("Approximate vector index created"),
            Ok(false) => {}
            Err(e) => warn!("Continuing with exact search: {}", e),
        }

        if let Err(e) = vector_store.optimize().await {
            warn!("Vector store optimization failed: {}", e);
        }
        if let Err(e) = database.optimize().await {
            warn!("Metadata database optimization failed: {:#}", e);
        }

        let report = BuildReport {
            build_id,
            records: dataset.len(),
            entries: entries.len(),
            chunked_records,
            skipped: dataset.skipped,
            dataset_hash: dataset.content_hash,
            elapsed: started.elapsed(),
        };

        info!("{}", report.summary());
        Ok(report)
    }

    fn embed_chunks(&self, chunks: &[&TextChunk]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.config.ollama.batch_size.max(1) as usize;
        let expected_dimension = self.config.ollama.embedding_dimension as usize;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(self.embedder.model_name().to_string());

        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();

            let batch_vectors = self.embedder.embed_batch(&texts).map_err(|e| {
                RagError::Embedding(format!(
                    "Failed to embed chunks starting at record {}: {:#}",
                    batch[0].record_index, e
                ))
            })?;

            if batch_vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Embedder returned {} vectors for {} chunks",
                    batch_vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(&batch_vectors) {
                if vector.len() != expected_dimension {
                    return Err(RagError::Embedding(format!(
                        "Embedding for record {} has dimension {} but {} is configured",
                        chunk.record_index,
                        vector.len(),
                        expected_dimension
                    )));
                }
            }

            vectors.extend(batch_vectors);
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        Ok(vectors)
    }

    fn create_entries(
        &self,
        dataset: &Dataset,
        chunks: &[&TextChunk],
        vectors: Vec<Vec<f32>>,
    ) -> Vec<IndexEntry> {
        let created_at = Utc::now().to_rfc3339();

        chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(entry_index, (chunk, vector))| {
                let record = &dataset.records[chunk.record_index];
                IndexEntry::from_chunk(
                    entry_index as u32,
                    chunk,
                    vector,
                    &record.instruction,
                    &record.category,
                    &record.source,
                    &created_at,
                )
            })
            .collect()
    }
}
