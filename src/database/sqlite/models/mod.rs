
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::dataset::Record;

/// A dataset record as kept in the snapshot next to the vectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredRecord {
    pub record_index: i64,
    pub instruction: String,
    pub input: String,
    pub output: String,
    pub category: String,
    pub source: String,
    /// Number of index entries produced from this record
    pub chunk_count: i64,
}

/// Metadata describing one completed index build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexManifest {
    pub build_id: String,
    pub dataset_path: String,
    pub dataset_hash: String,
    pub record_count: i64,
    pub entry_count: i64,
    pub embedding_model: String,
    pub embedding_dimension: i64,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub config_fingerprint: String,
    pub built_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

impl StoredRecord {
    #[inline]
    pub fn from_record(record: &Record, chunk_count: usize) -> Self {
        Self {
            record_index: record.record_index as i64,
            instruction: record.instruction.clone(),
            input: record.input.clone(),
            output: record.output.clone(),
            category: record.category.clone(),
            source: record.source.clone(),
            chunk_count: chunk_count as i64,
        }
    }

    #[inline]
    pub fn into_record(self) -> Record {
        Record {
            record_index: self.record_index as usize,
            instruction: self.instruction,
            input: self.input,
            output: self.output,
            category: self.category,
            source: self.source,
        }
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        self.chunk_count > 1
    }
}

impl IndexManifest {
    /// Whether chunking parameters match the given configuration
    #[inline]
    pub fn matches_chunking(&self, chunk_size: usize, chunk_overlap: usize) -> bool {
        self.chunk_size == chunk_size as i64 && self.chunk_overlap == chunk_overlap as i64
    }

    /// Short form of the build id for display
    #[inline]
    pub fn short_build_id(&self) -> &str {
        self.build_id.get(..8).unwrap_or(&self.build_id)
    }
}
