use super::*;
use crate::config::OllamaConfig;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const TEST_DIMENSION: u32 = 8;

/// Embeds text as byte statistics; deterministic and cheap
struct ByteEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl ByteEmbedder {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Embedder for ByteEmbedder {
    fn model_name(&self) -> &str {
        "byte-embedder"
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte) / 255.0;
        }
        Ok(vector)
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-embedder"
    }

    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

fn create_test_config(temp_dir: &TempDir) -> Config {
    Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            embedding_dimension: TEST_DIMENSION,
            batch_size: 2,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

fn write_dataset(temp_dir: &TempDir, json: &str) -> std::path::PathBuf {
    let path = temp_dir.path().join("deduplicated_dataset.json");
    fs::write(&path, json).expect("should write dataset");
    path
}

const SMALL_DATASET: &str = r#"[
    {"instruction": "Best riads in Fez?", "output": "Riad Fes and Dar Seffarine.", "category": "accommodation"},
    {"instruction": "How to get from Casablanca to Marrakech?", "output": "Take the train from Casa Voyageurs.", "category": "transport"},
    {"instruction": "What is msemen?", "output": "A square, flaky flatbread.", "category": "food"}
]"#;

#[tokio::test]
async fn build_indexes_every_record() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&temp_dir, SMALL_DATASET);
    let embedder = Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize));

    let builder = IndexBuilder::new(config.clone(), Arc::clone(&embedder) as Arc<dyn Embedder>);
    let report = builder.build(&dataset_path).await.expect("build should succeed");

    assert_eq!(report.records, 3);
    assert_eq!(report.entries, 3);
    assert_eq!(report.chunked_records, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.dataset_hash.len(), 64);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    assert!(report.summary().starts_with("Indexed 3 records as 3 entries"));

    let vector_store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    assert_eq!(vector_store.count_entries().await.expect("should count"), 3);

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let manifest = database
        .latest_manifest()
        .await
        .expect("should query manifest")
        .expect("manifest should exist");
    assert_eq!(manifest.build_id, report.build_id);
    assert_eq!(manifest.embedding_model, "byte-embedder");
    assert_eq!(manifest.embedding_dimension, i64::from(TEST_DIMENSION));
    assert_eq!(manifest.config_fingerprint, config.fingerprint());
}

#[tokio::test]
async fn empty_dataset_is_fatal() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&temp_dir, "[]");

    let builder = IndexBuilder::new(config, Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize)));
    let result = builder.build(&dataset_path).await;

    assert!(
        matches!(result, Err(RagError::Dataset(message)) if message == "dataset contains no records")
    );
}

#[tokio::test]
async fn missing_dataset_is_fatal() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);

    let builder = IndexBuilder::new(config, Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize)));
    let result = builder.build(&temp_dir.path().join("absent.json")).await;

    assert!(matches!(result, Err(RagError::Dataset(_))));
}

#[tokio::test]
async fn wrong_embedding_dimension_is_fatal() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&temp_dir, SMALL_DATASET);

    let builder = IndexBuilder::new(config, Arc::new(ByteEmbedder::new(16)));
    let result = builder.build(&dataset_path).await;

    assert!(matches!(result, Err(RagError::Embedding(message)) if message.contains("dimension 16")));
}

#[tokio::test]
async fn failed_build_keeps_previous_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&temp_dir, SMALL_DATASET);

    let first = IndexBuilder::new(
        config.clone(),
        Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize)),
    )
    .build(&dataset_path)
    .await
    .expect("first build should succeed");

    let result = IndexBuilder::new(config.clone(), Arc::new(FailingEmbedder))
        .build(&dataset_path)
        .await;
    assert!(matches!(result, Err(RagError::Embedding(message)) if message.contains("connection refused")));

    let vector_store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    assert_eq!(vector_store.count_entries().await.expect("should count"), 3);

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let manifest = database
        .latest_manifest()
        .await
        .expect("should query manifest")
        .expect("manifest should exist");
    assert_eq!(manifest.build_id, first.build_id);
}

#[tokio::test]
async fn rebuild_replaces_previous_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&temp_dir, SMALL_DATASET);
    let builder = IndexBuilder::new(
        config.clone(),
        Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize)),
    );

    let first = builder.build(&dataset_path).await.expect("first build");

    write_dataset(
        &temp_dir,
        r#"[{"instruction": "Is Agadir good for surfing?", "output": "Yes, Taghazout nearby is famous."}]"#,
    );
    let second = builder.build(&dataset_path).await.expect("second build");

    assert_ne!(first.build_id, second.build_id);
    assert_ne!(first.dataset_hash, second.dataset_hash);

    let vector_store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    assert_eq!(vector_store.count_entries().await.expect("should count"), 1);

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    assert_eq!(database.count_records().await.expect("should count"), 1);
}

#[tokio::test]
async fn skipped_entries_are_reported() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = create_test_config(&temp_dir);
    config.dataset.skip_invalid = true;
    let dataset_path = write_dataset(
        &temp_dir,
        r#"[
            {"instruction": "Where is Volubilis?", "output": "Near Meknes."},
            {"instruction": "", "input": "", "output": ""},
            [1, 2, 3]
        ]"#,
    );

    let report = IndexBuilder::new(config, Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    assert_eq!(report.records, 1);
    assert_eq!(report.entries, 1);
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn interrupted_build_leaves_no_manifest() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&temp_dir, SMALL_DATASET);
    let builder = IndexBuilder::new(
        config.clone(),
        Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize)),
    );

    builder.build(&dataset_path).await.expect("first build");

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    sqlx::query(
        "CREATE TRIGGER reject_manifest BEFORE INSERT ON index_manifest
         BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END",
    )
    .execute(database.pool())
    .await
    .expect("should create trigger");

    // Same number of records, different content
    write_dataset(
        &temp_dir,
        r#"[
            {"instruction": "Best riads in Marrakech?", "output": "Riad Yasmine.", "category": "accommodation"},
            {"instruction": "How to reach Essaouira?", "output": "Supratours bus from Marrakech.", "category": "transport"},
            {"instruction": "What is harira?", "output": "A tomato and lentil soup.", "category": "food"}
        ]"#,
    );
    let result = builder.build(&dataset_path).await;
    assert!(matches!(result, Err(RagError::Database(_))));

    let vector_store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    assert_eq!(vector_store.count_entries().await.expect("should count"), 3);

    let report = ConsistencyChecker::new(&database, &vector_store)
        .check(&config, "byte-embedder")
        .await
        .expect("check should run");

    assert!(report.has_fatal());
    assert_eq!(report.issues, vec![ConsistencyIssue::MissingManifest]);
    assert!(matches!(report.ensure_usable(), Err(RagError::StaleIndex(_))));
}

#[tokio::test]
async fn manifest_records_absolute_dataset_path() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&temp_dir, SMALL_DATASET);

    IndexBuilder::new(
        config.clone(),
        Arc::new(ByteEmbedder::new(TEST_DIMENSION as usize)),
    )
    .build(&dataset_path)
    .await
    .expect("build should succeed");

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let manifest = database
        .latest_manifest()
        .await
        .expect("should query manifest")
        .expect("manifest should exist");

    assert!(std::path::Path::new(&manifest.dataset_path).is_absolute());
    assert_eq!(manifest.dataset_path, dataset_path.display().to_string());
}
