
use super::{EntryMetadata, IndexEntry};
use crate::RagError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "entries";

/// Extra candidates fetched beyond `k` so that equal distances at the cut-off
/// are resolved by insertion order rather than by scan order
const TIE_CANDIDATES: usize = 8;

/// Vector index over the chunk embeddings, backed by a LanceDB directory
pub struct VectorStore {
    connection: Connection,
    table_name: String,
}

/// One nearest-neighbour result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub metadata: EntryMetadata,
    /// Squared L2 distance between query and entry vectors
    pub distance: f32,
    /// `1 / (1 + distance)`, higher is closer
    pub similarity_score: f32,
}

impl VectorStore {
    /// Connect to the LanceDB directory at `path`, creating it when missing.
    ///
    /// No table is created here; call [`VectorStore::reset`] before storing entries.
    #[inline]
    pub async fn open(path: &Path) -> Result<Self, RagError> {
        debug!("Opening LanceDB at path: {}", path.display());

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.display().to_string();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt") || error_msg.contains("malformed") {
                    warn!("Vector database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        RagError::Database(format!(
                            "Failed to connect to LanceDB after recovery: {}",
                            e
                        ))
                    })?
                } else {
                    return Err(RagError::Database(format!(
                        "Failed to connect to LanceDB: {}",
                        e
                    )));
                }
            }
        };

        Ok(Self {
            connection,
            table_name: TABLE_NAME.to_string(),
        })
    }

    /// Whether a build has created the entries table
    #[inline]
    pub async fn has_table(&self) -> Result<bool, RagError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    /// Drop every stored entry and recreate the table for vectors of `dimension`
    #[inline]
    pub async fn reset(&self, dimension: usize) -> Result<(), RagError> {
        info!("Resetting vector table with dimension {}", dimension);

        self.drop_table_if_exists().await?;

        self.connection
            .create_empty_table(&self.table_name, create_schema(dimension))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<(), RagError> {
        if self.has_table().await? {
            debug!("Dropping existing entries table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    async fn open_table(&self) -> Result<Table, RagError> {
        if !self.has_table().await? {
            return Err(RagError::Database(format!(
                "Vector table '{}' does not exist; build the index first",
                self.table_name
            )));
        }

        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    /// Vector dimension of the stored table, `None` before the first build
    #[inline]
    pub async fn dimension(&self) -> Result<Option<usize>, RagError> {
        if !self.has_table().await? {
            return Ok(None);
        }

        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        let dimension = schema.fields().iter().find_map(|field| {
            match (field.name().as_str(), field.data_type()) {
                ("vector", DataType::FixedSizeList(_, size)) => Some(*size as usize),
                _ => None,
            }
        });

        dimension.map(Some).ok_or_else(|| {
            RagError::Database("Could not find vector column or determine dimension".to_string())
        })
    }

    /// Append a batch of entries; every vector must match the table dimension
    #[inline]
    pub async fn store_entries(&self, entries: &[IndexEntry]) -> Result<(), RagError> {
        if entries.is_empty() {
            debug!("No entries to store");
            return Ok(());
        }

        let vector_dim = self.dimension().await?.ok_or_else(|| {
            RagError::Database("Vector table has not been created".to_string())
        })?;

        if let Some(entry) = entries.iter().find(|e| e.vector.len() != vector_dim) {
            return Err(RagError::Database(format!(
                "Entry {} has dimension {} but the index expects {}",
                entry.id,
                entry.vector.len(),
                vector_dim
            )));
        }

        debug!("Storing batch of {} entries", entries.len());

        let record_batch = create_record_batch(entries, vector_dim)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert entries: {}", e)))?;

        debug!("Stored {} entries", entries.len());
        Ok(())
    }

    /// The `k` entries closest to `query_vector` by L2 distance.
    ///
    /// Results are ordered by ascending distance, equal distances by insertion order.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let dimension = self.dimension().await?.ok_or_else(|| {
            RagError::Database(format!(
                "Vector table '{}' does not exist; build the index first",
                self.table_name
            ))
        })?;

        if dimension != query_vector.len() {
            return Err(RagError::Query(format!(
                "Query vector has dimension {} but the index expects {}",
                query_vector.len(),
                dimension
            )));
        }

        debug!("Searching for {} nearest entries", k);

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::L2)
            .limit(k.saturating_add(TIE_CANDIDATES))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = parse_search_results_stream(results).await?;
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.metadata.entry_index.cmp(&b.metadata.entry_index))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Number of stored entries; zero before the first build
    #[inline]
    pub async fn count_entries(&self) -> Result<u64, RagError> {
        if !self.has_table().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Build an approximate index once the table holds at least `min_entries` rows.
    ///
    /// Returns whether an index was created. Smaller tables stay on exact search.
    #[inline]
    pub async fn create_vector_index(&self, min_entries: u64) -> Result<bool, RagError> {
        let count = self.count_entries().await?;
        if count < min_entries {
            debug!(
                "Skipping vector index: {} entries is below the threshold of {}",
                count, min_entries
            );
            return Ok(false);
        }

        info!("Creating vector index over {} entries", count);

        let table = self.open_table().await?;
        table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create vector index: {}", e)))?;

        Ok(true)
    }

    /// Compact the data files written by a build
    #[inline]
    pub async fn optimize(&self) -> Result<(), RagError> {
        debug!("Optimizing vector database");

        let table = self.open_table().await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::Database(format!("Failed to optimize table: {}", e)))?;

        debug!("Vector database optimization completed");
        Ok(())
    }

    fn attempt_corruption_recovery(db_path: &Path) -> Result<(), RagError> {
        warn!("Attempting database corruption recovery at {}", db_path.display());

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {}", backup_path.display());
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                RagError::Database(format!("Failed to remove corrupted database: {}", e))
            })?;
        }

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to recreate vector database directory: {}", e))
        })?;

        Ok(())
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("entry_index", DataType::UInt32, false),
        Field::new("record_index", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("instruction", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(entries: &[IndexEntry], vector_dim: usize) -> Result<RecordBatch, RagError> {
    let len = entries.len();

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut entry_indices = Vec::with_capacity(len);
    let mut record_indices = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut categories = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut instructions = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for entry in entries {
        ids.push(entry.id.as_str());
        flat_values.extend_from_slice(&entry.vector);
        entry_indices.push(entry.metadata.entry_index);
        record_indices.push(entry.metadata.record_index);
        chunk_indices.push(entry.metadata.chunk_index);
        contents.push(entry.metadata.content.as_str());
        categories.push(entry.metadata.category.as_str());
        sources.push(entry.metadata.source.as_str());
        instructions.push(entry.metadata.instruction.as_str());
        created_ats.push(entry.metadata.created_at.as_str());
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(UInt32Array::from(entry_indices)),
        Arc::new(UInt32Array::from(record_indices)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(categories)),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(instructions)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<SearchHit>, RagError> {
    let mut hits = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
    {
        hits.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results", hits.len());
    Ok(hits)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>, RagError> {
    let entry_indices = u32_column(batch, "entry_index")?;
    let record_indices = u32_column(batch, "record_index")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let contents = string_column(batch, "content")?;
    let categories = string_column(batch, "category")?;
    let sources = string_column(batch, "source")?;
    let instructions = string_column(batch, "instruction")?;
    let created_ats = string_column(batch, "created_at")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let hits = (0..batch.num_rows())
        .map(|row| {
            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            SearchHit {
                metadata: EntryMetadata {
                    entry_index: entry_indices.value(row),
                    record_index: record_indices.value(row),
                    chunk_index: chunk_indices.value(row),
                    content: contents.value(row).to_string(),
                    category: categories.value(row).to_string(),
                    source: sources.value(row).to_string(),
                    instruction: instructions.value(row).to_string(),
                    created_at: created_ats.value(row).to_string(),
                },
                distance,
                similarity_score: 1.0 / (1.0 + distance),
            }
        })
        .collect();

    Ok(hits)
}
