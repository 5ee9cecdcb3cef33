use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{CategoryCount, IndexManifest, StoredRecord};
use crate::database::sqlite::queries::{ManifestQueries, RecordQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Record snapshot and build manifests stored next to the vector index
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create index directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        debug!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Forget the current build so the index reads as unbuilt until a new snapshot lands
    #[inline]
    pub async fn invalidate_manifest(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin manifest transaction")?;

        let removed = ManifestQueries::delete_all(&mut tx).await?;

        tx.commit()
            .await
            .context("Failed to commit manifest removal")?;

        debug!("Removed {} manifest rows", removed);
        Ok(())
    }

    /// Replace the stored records and manifest with those of a new build.
    ///
    /// Runs in one transaction: readers see either the old snapshot or the new one.
    #[inline]
    pub async fn replace_snapshot(
        &self,
        records: &[StoredRecord],
        manifest: &IndexManifest,
    ) -> Result<()> {
        info!(
            "Writing snapshot of {} records for build {}",
            records.len(),
            manifest.build_id
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin snapshot transaction")?;

        RecordQueries::delete_all(&mut tx).await?;
        ManifestQueries::delete_all(&mut tx).await?;

        for record in records {
            RecordQueries::insert(&mut tx, record).await?;
        }
        ManifestQueries::insert(&mut tx, manifest).await?;

        tx.commit()
            .await
            .context("Failed to commit snapshot transaction")?;

        debug!("Snapshot committed");
        Ok(())
    }

    #[inline]
    pub async fn latest_manifest(&self) -> Result<Option<IndexManifest>> {
        ManifestQueries::latest(&self.pool).await
    }

    #[inline]
    pub async fn count_records(&self) -> Result<i64> {
        RecordQueries::count(&self.pool).await
    }

    #[inline]
    pub async fn count_chunked_records(&self) -> Result<i64> {
        RecordQueries::count_chunked(&self.pool).await
    }

    #[inline]
    pub async fn record_by_index(&self, record_index: usize) -> Result<Option<StoredRecord>> {
        RecordQueries::get_by_index(&self.pool, record_index as i64).await
    }

    #[inline]
    pub async fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        RecordQueries::category_counts(&self.pool).await
    }

    /// Reclaim space left by the previous snapshot
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing metadata database");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        Ok(())
    }
}
