
use super::models::*;
use anyhow::{Context, Result};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

const MANIFEST_COLUMNS: &str = "build_id, dataset_path, dataset_hash, record_count, entry_count, \
     embedding_model, embedding_dimension, chunk_size, chunk_overlap, config_fingerprint, built_at";

pub struct RecordQueries;

impl RecordQueries {
    #[inline]
    pub async fn insert(conn: &mut SqliteConnection, record: &StoredRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO records (record_index, instruction, input, output, category, source, chunk_count)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.record_index)
        .bind(&record.instruction)
        .bind(&record.input)
        .bind(&record.output)
        .bind(&record.category)
        .bind(&record.source)
        .bind(record.chunk_count)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to insert record {}", record.record_index))?;

        Ok(())
    }

    #[inline]
    pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records")
            .execute(conn)
            .await
            .context("Failed to clear records")?;

        debug!("Deleted {} records", result.rows_affected());
        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn get_by_index(pool: &SqlitePool, record_index: i64) -> Result<Option<StoredRecord>> {
        sqlx::query_as::<_, StoredRecord>(
            "SELECT record_index, instruction, input, output, category, source, chunk_count
             FROM records WHERE record_index = ?",
        )
        .bind(record_index)
        .fetch_optional(pool)
        .await
        .context("Failed to get record by index")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM records")
            .fetch_one(pool)
            .await
            .context("Failed to count records")
    }

    #[inline]
    pub async fn count_chunked(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM records WHERE chunk_count > 1")
            .fetch_one(pool)
            .await
            .context("Failed to count chunked records")
    }

    /// Records per category, largest first; blank categories are reported as `uncategorized`
    #[inline]
    pub async fn category_counts(pool: &SqlitePool) -> Result<Vec<CategoryCount>> {
        sqlx::query_as::<_, CategoryCount>(
            "SELECT CASE WHEN TRIM(category) = '' THEN 'uncategorized' ELSE category END AS category,
                    COUNT(*) AS count
             FROM records
             GROUP BY 1
             ORDER BY count DESC, category ASC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to count records per category")
    }
}

pub struct ManifestQueries;

impl ManifestQueries {
    #[inline]
    pub async fn insert(conn: &mut SqliteConnection, manifest: &IndexManifest) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO index_manifest ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            MANIFEST_COLUMNS
        ))
        .bind(&manifest.build_id)
        .bind(&manifest.dataset_path)
        .bind(&manifest.dataset_hash)
        .bind(manifest.record_count)
        .bind(manifest.entry_count)
        .bind(&manifest.embedding_model)
        .bind(manifest.embedding_dimension)
        .bind(manifest.chunk_size)
        .bind(manifest.chunk_overlap)
        .bind(&manifest.config_fingerprint)
        .bind(manifest.built_at)
        .execute(conn)
        .await
        .context("Failed to insert index manifest")?;

        Ok(())
    }

    #[inline]
    pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
        let result = sqlx::query("DELETE FROM index_manifest")
            .execute(conn)
            .await
            .context("Failed to clear index manifests")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn latest(pool: &SqlitePool) -> Result<Option<IndexManifest>> {
        sqlx::query_as::<_, IndexManifest>(&format!(
            "SELECT {} FROM index_manifest ORDER BY id DESC LIMIT 1",
            MANIFEST_COLUMNS
        ))
        .fetch_optional(pool)
        .await
        .context("Failed to get latest index manifest")
    }
}
