// Index consistency validation
// Compares the latest build manifest with the live configuration, dataset and stores


use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::IndexManifest;
use crate::dataset::hash_file;
use crate::{RagError, Result};

/// One way in which the persisted index no longer matches its surroundings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyIssue {
    /// No build has completed
    MissingManifest,
    EmbeddingModelChanged {
        indexed: String,
        configured: String,
    },
    DimensionChanged {
        indexed: i64,
        configured: i64,
    },
    EntryCountMismatch {
        expected: i64,
        stored: i64,
    },
    RecordCountMismatch {
        expected: i64,
        stored: i64,
    },
    ChunkingChanged {
        indexed: (i64, i64),
        configured: (usize, usize),
    },
    DatasetChanged {
        path: PathBuf,
    },
    DatasetMissing {
        path: PathBuf,
    },
}

/// Result of comparing the index with the current setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub manifest: Option<IndexManifest>,
    pub issues: Vec<ConsistencyIssue>,
    pub is_consistent: bool,
}

/// Checks whether the persisted index can still serve queries
pub struct ConsistencyChecker<'a> {
    database: &'a Database,
    vector_store: &'a VectorStore,
}

impl ConsistencyIssue {
    /// Fatal issues make retrieval meaningless; the rest only mean answers may be out of date
    #[inline]
    pub fn is_fatal(&self) -> bool {
        match *self {
            Self::MissingManifest
            | Self::EmbeddingModelChanged { .. }
            | Self::DimensionChanged { .. }
            | Self::EntryCountMismatch { .. }
            | Self::RecordCountMismatch { .. } => true,
            Self::ChunkingChanged { .. }
            | Self::DatasetChanged { .. }
            | Self::DatasetMissing { .. } => false,
        }
    }
}

impl fmt::Display for ConsistencyIssue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingManifest => write!(f, "no index has been built"),
            Self::EmbeddingModelChanged {
                indexed,
                configured,
            } => write!(
                f,
                "index was embedded with {} but {} is configured",
                indexed, configured
            ),
            Self::DimensionChanged {
                indexed,
                configured,
            } => write!(
                f,
                "index has {}-dimensional vectors but {} is configured",
                indexed, configured
            ),
            Self::EntryCountMismatch { expected, stored } => write!(
                f,
                "manifest lists {} entries but the vector store holds {}",
                expected, stored
            ),
            Self::RecordCountMismatch { expected, stored } => write!(
                f,
                "manifest lists {} records but the snapshot holds {}",
                expected, stored
            ),
            Self::ChunkingChanged {
                indexed,
                configured,
            } => write!(
                f,
                "index was chunked with size {} / overlap {} but {} / {} is configured",
                indexed.0, indexed.1, configured.0, configured.1
            ),
            Self::DatasetChanged { path } => {
                write!(f, "dataset {} changed since the last build", path.display())
            }
            Self::DatasetMissing { path } => {
                write!(f, "dataset {} no longer exists", path.display())
            }
        }
    }
}

impl ConsistencyReport {
    #[inline]
    pub fn has_fatal(&self) -> bool {
        self.issues.iter().any(ConsistencyIssue::is_fatal)
    }

    #[inline]
    pub fn warnings(&self) -> impl Iterator<Item = &ConsistencyIssue> {
        self.issues.iter().filter(|issue| !issue.is_fatal())
    }

    /// Fail with [`RagError::StaleIndex`] when any fatal issue was found
    #[inline]
    pub fn ensure_usable(&self) -> Result<()> {
        let fatal: Vec<String> = self
            .issues
            .iter()
            .filter(|issue| issue.is_fatal())
            .map(ToString::to_string)
            .collect();

        if fatal.is_empty() {
            Ok(())
        } else {
            Err(RagError::StaleIndex(format!(
                "{}; run `morocco-rag build` to rebuild the index",
                fatal.join("; ")
            )))
        }
    }

    #[inline]
    pub fn summary(&self) -> String {
        match (&self.manifest, self.is_consistent) {
            (Some(manifest), true) => format!(
                "Index is current: build {} with {} entries from {} records",
                manifest.short_build_id(),
                manifest.entry_count,
                manifest.record_count
            ),
            _ => format!(
                "Index has {} issue(s), {} fatal",
                self.issues.len(),
                self.issues.iter().filter(|i| i.is_fatal()).count()
            ),
        }
    }
}

impl<'a> ConsistencyChecker<'a> {
    #[inline]
    pub fn new(database: &'a Database, vector_store: &'a VectorStore) -> Self {
        Self {
            database,
            vector_store,
        }
    }

    /// Compare the latest manifest with `config`, the model of the query-time embedder,
    /// the dataset file the index was built from and the contents of both stores
    #[inline]
    pub async fn check(&self, config: &Config, embedder_model: &str) -> Result<ConsistencyReport> {
        debug!("Checking index consistency");

        let manifest = self
            .database
            .latest_manifest()
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;

        let Some(manifest) = manifest else {
            warn!("No index manifest found");
            return Ok(ConsistencyReport {
                manifest: None,
                issues: vec![ConsistencyIssue::MissingManifest],
                is_consistent: false,
            });
        };

        let mut issues = Vec::new();

        if manifest.embedding_model != embedder_model {
            issues.push(ConsistencyIssue::EmbeddingModelChanged {
                indexed: manifest.embedding_model.clone(),
                configured: embedder_model.to_string(),
            });
        }

        let configured_dimension = i64::from(config.ollama.embedding_dimension);
        let stored_dimension = self.vector_store.dimension().await?.map(|d| d as i64);
        if manifest.embedding_dimension != configured_dimension
            || stored_dimension.is_some_and(|d| d != configured_dimension)
        {
            issues.push(ConsistencyIssue::DimensionChanged {
                indexed: stored_dimension.unwrap_or(manifest.embedding_dimension),
                configured: configured_dimension,
            });
        }

        let stored_entries = self.vector_store.count_entries().await? as i64;
        if stored_entries != manifest.entry_count {
            issues.push(ConsistencyIssue::EntryCountMismatch {
                expected: manifest.entry_count,
                stored: stored_entries,
            });
        }

        let stored_records = self
            .database
            .count_records()
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))?;
        if stored_records != manifest.record_count {
            issues.push(ConsistencyIssue::RecordCountMismatch {
                expected: manifest.record_count,
                stored: stored_records,
            });
        }

        if !manifest.matches_chunking(config.chunking.chunk_size, config.chunking.chunk_overlap) {
            issues.push(ConsistencyIssue::ChunkingChanged {
                indexed: (manifest.chunk_size, manifest.chunk_overlap),
                configured: (config.chunking.chunk_size, config.chunking.chunk_overlap),
            });
        }

        let dataset_path = PathBuf::from(&manifest.dataset_path);
        if dataset_path.exists() {
            if hash_file(&dataset_path)? != manifest.dataset_hash {
                issues.push(ConsistencyIssue::DatasetChanged { path: dataset_path });
            }
        } else {
            issues.push(ConsistencyIssue::DatasetMissing { path: dataset_path });
        }

        let is_consistent = issues.is_empty();
        if is_consistent {
            info!("Index build {} is consistent", manifest.short_build_id());
        } else {
            for issue in &issues {
                warn!("Index consistency: {}", issue);
            }
        }

        Ok(ConsistencyReport {
            manifest: Some(manifest),
            issues,
            is_consistent,
        })
    }
}
