#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests for building the index and querying it
//!
//! A deterministic hashing embedder stands in for Ollama, so these tests need no
//! running model server.

mod common;

use std::sync::Arc;

use morocco_rag::RagError;
use morocco_rag::assistant::Retriever;
use morocco_rag::config::Config;
use morocco_rag::database::lancedb::VectorStore;
use morocco_rag::database::sqlite::Database;
use morocco_rag::dataset::load_dataset;
use morocco_rag::embeddings::Embedder;
use morocco_rag::indexer::{ConsistencyChecker, ConsistencyIssue, IndexBuilder};
use tempfile::TempDir;

use common::{
    HashingEmbedder, TEST_DIMENSION, TOURISM_DATASET, create_test_config, write_dataset,
};

async fn open_retriever(config: &Config, top_k: usize) -> Retriever {
    let store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    Retriever::new(store, Arc::new(HashingEmbedder::new(TEST_DIMENSION)), top_k)
}

#[tokio::test]
async fn index_holds_one_entry_per_short_record() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, TOURISM_DATASET);

    let report = IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    assert_eq!(report.records, 5);
    assert_eq!(report.entries, 5);
    assert_eq!(report.chunked_records, 0);

    let store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    assert_eq!(store.count_entries().await.expect("should count"), 5);
    assert_eq!(
        store.dimension().await.expect("should read schema"),
        Some(TEST_DIMENSION as usize)
    );

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    assert_eq!(database.count_records().await.expect("should count"), 5);

    let manifest = database
        .latest_manifest()
        .await
        .expect("should query manifest")
        .expect("manifest should exist");
    assert_eq!(manifest.record_count, 5);
    assert_eq!(manifest.entry_count, 5);
    assert_eq!(manifest.embedding_model, "hashing-embedder");
    assert_eq!(manifest.dataset_hash, report.dataset_hash);
}

#[tokio::test]
async fn exact_record_content_is_the_top_hit() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, TOURISM_DATASET);

    IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    let dataset = load_dataset(&dataset_path, false).expect("dataset should load");
    let retriever = open_retriever(&config, 3).await;

    for record in &dataset.records {
        let hits = retriever
            .retrieve(&record.content())
            .await
            .expect("retrieval should succeed");

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].metadata.record_index as usize, record.record_index);
        assert!(hits[0].distance < 1e-4, "distance was {}", hits[0].distance);
        assert_eq!(hits[0].metadata.content, record.content());
        assert_eq!(hits[0].metadata.category, record.category);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}

#[tokio::test]
async fn related_question_finds_the_matching_record() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, TOURISM_DATASET);

    IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    let retriever = open_retriever(&config, 1).await;
    let hits = retriever
        .retrieve("Where can I surf in Morocco")
        .await
        .expect("retrieval should succeed");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.record_index, 2);
}

#[tokio::test]
async fn rebuild_gives_identical_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, TOURISM_DATASET);
    let builder = IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)));

    builder.build(&dataset_path).await.expect("first build");
    let first: Vec<(u32, u32)> = open_retriever(&config, 5)
        .await
        .retrieve("tea and tagine in the desert")
        .await
        .expect("retrieval should succeed")
        .iter()
        .map(|hit| (hit.metadata.entry_index, hit.metadata.record_index))
        .collect();

    builder.build(&dataset_path).await.expect("second build");
    let second: Vec<(u32, u32)> = open_retriever(&config, 5)
        .await
        .retrieve("tea and tagine in the desert")
        .await
        .expect("retrieval should succeed")
        .iter()
        .map(|hit| (hit.metadata.entry_index, hit.metadata.record_index))
        .collect();

    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
}

#[tokio::test]
async fn duplicate_records_are_both_indexed() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(
        &config,
        r#"[
            {"instruction": "Do I need a visa?", "output": "Many nationalities get 90 days on arrival.", "category": "travel_tips"},
            {"instruction": "Where is Volubilis?", "output": "Near Meknes.", "category": "history"},
            {"instruction": "Do I need a visa?", "output": "Many nationalities get 90 days on arrival.", "category": "travel_tips"}
        ]"#,
    );

    let report = IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");
    assert_eq!(report.records, 3);
    assert_eq!(report.entries, 3);

    let dataset = load_dataset(&dataset_path, false).expect("dataset should load");
    let hits = open_retriever(&config, 2)
        .await
        .retrieve(&dataset.records[0].content())
        .await
        .expect("retrieval should succeed");

    let records: Vec<u32> = hits.iter().map(|hit| hit.metadata.record_index).collect();
    assert_eq!(records, vec![0, 2]);
    assert!((hits[0].distance - hits[1].distance).abs() < 1e-6);
}

#[tokio::test]
async fn long_record_is_split_into_entries_of_the_same_record() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);

    let long_answer = (1..=30)
        .map(|day| {
            format!(
                "Day {}: wander the souks, visit a riad garden and drink mint tea on a rooftop terrace.",
                day
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let json = serde_json::json!([
        {"instruction": "Plan a month in Morocco", "output": long_answer, "category": "itinerary"},
        {"instruction": "Currency?", "output": "The Moroccan dirham.", "category": "travel_tips"}
    ])
    .to_string();
    let dataset_path = write_dataset(&config, &json);

    let report = IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    assert_eq!(report.records, 2);
    assert_eq!(report.chunked_records, 1);
    assert!(report.entries > 2);

    let hits = open_retriever(&config, report.entries)
        .await
        .retrieve("souks riad garden mint tea rooftop")
        .await
        .expect("retrieval should succeed");
    assert_eq!(hits.len(), report.entries);

    let long_hits: Vec<_> = hits
        .iter()
        .filter(|hit| hit.metadata.record_index == 0)
        .collect();
    assert_eq!(long_hits.len(), report.entries - 1);
    assert!(
        long_hits
            .iter()
            .all(|hit| hit.metadata.content.chars().count() <= config.chunking.chunk_size)
    );

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let stored = database
        .record_by_index(0)
        .await
        .expect("should query record")
        .expect("record should exist");
    assert!(stored.is_chunked());
    assert_eq!(stored.chunk_count as usize, report.entries - 1);
}

#[tokio::test]
async fn empty_dataset_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, "[]");

    let result = IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await;

    assert!(matches!(result, Err(RagError::Dataset(_))));

    let store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    assert_eq!(store.count_entries().await.expect("should count"), 0);
}

#[tokio::test]
async fn fresh_index_is_consistent() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, TOURISM_DATASET);

    IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");

    let report = ConsistencyChecker::new(&database, &store)
        .check(&config, "hashing-embedder")
        .await
        .expect("check should run");

    assert!(report.is_consistent, "issues: {:?}", report.issues);
    assert!(report.ensure_usable().is_ok());
}

#[tokio::test]
async fn changed_dataset_is_a_warning() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, TOURISM_DATASET);

    IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    write_dataset(
        &config,
        r#"[{"instruction": "New question", "output": "New answer", "category": "misc"}]"#,
    );

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    let report = ConsistencyChecker::new(&database, &store)
        .check(&config, "hashing-embedder")
        .await
        .expect("check should run");

    assert!(!report.is_consistent);
    assert!(!report.has_fatal());
    assert!(
        report
            .issues
            .iter()
            .any(|issue| matches!(issue, ConsistencyIssue::DatasetChanged { .. }))
    );
    assert!(report.ensure_usable().is_ok());
}

#[tokio::test]
async fn different_query_model_makes_index_unusable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let dataset_path = write_dataset(&config, TOURISM_DATASET);

    IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&dataset_path)
        .await
        .expect("build should succeed");

    let query_embedder = HashingEmbedder::named("another-model", TEST_DIMENSION);
    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    let report = ConsistencyChecker::new(&database, &store)
        .check(&config, query_embedder.model_name())
        .await
        .expect("check should run");

    assert!(report.has_fatal());
    assert!(report.issues.iter().any(|issue| matches!(
        issue,
        ConsistencyIssue::EmbeddingModelChanged { indexed, configured }
            if indexed == "hashing-embedder" && configured == "another-model"
    )));
    assert!(matches!(
        report.ensure_usable(),
        Err(RagError::StaleIndex(message)) if message.contains("morocco-rag build")
    ));
}

#[tokio::test]
async fn index_built_from_another_file_checks_that_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = create_test_config(&temp_dir);
    let extra_path = temp_dir.path().join("extra.json");
    std::fs::write(&extra_path, TOURISM_DATASET).expect("should write dataset");
    assert!(!config.dataset_path().exists());

    IndexBuilder::new(config.clone(), Arc::new(HashingEmbedder::new(TEST_DIMENSION)))
        .build(&extra_path)
        .await
        .expect("build should succeed");

    let database = Database::new(config.database_path())
        .await
        .expect("should open database");
    let store = VectorStore::open(&config.vector_database_path())
        .await
        .expect("should open vector store");
    let checker = ConsistencyChecker::new(&database, &store);

    let report = checker
        .check(&config, "hashing-embedder")
        .await
        .expect("check should run");
    assert!(report.is_consistent, "issues: {:?}", report.issues);

    std::fs::write(&extra_path, "[]").expect("should rewrite dataset");
    let report = checker
        .check(&config, "hashing-embedder")
        .await
        .expect("check should run");
    assert_eq!(
        report.issues,
        vec![ConsistencyIssue::DatasetChanged { path: extra_path }]
    );
}
