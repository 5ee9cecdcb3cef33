
use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use tracing::{info, warn};

use crate::assistant::{Assistant, Retriever};
use crate::chat::{TerminalTransport, start_chat};
use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::{Embedder, OllamaClient};
use crate::indexer::{ConsistencyChecker, ConsistencyReport, IndexBuilder};
use crate::{RagError, Result};

fn load_config(base_dir: &Path) -> Result<Config> {
    Config::load(base_dir).map_err(|e| RagError::Config(format!("{:#}", e)))
}

fn create_client(config: &Config) -> Result<OllamaClient> {
    OllamaClient::new(config).map_err(|e| RagError::Config(format!("{:#}", e)))
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(config.database_path())
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))
}

/// Open the index for querying, refusing when it cannot answer meaningfully
async fn open_retriever(config: &Config, client: &OllamaClient) -> Result<Retriever> {
    let database = open_database(config).await?;
    let vector_store = VectorStore::open(&config.vector_database_path()).await?;

    let report = ConsistencyChecker::new(&database, &vector_store)
        .check(config, client.model_name())
        .await?;
    report.ensure_usable()?;
    for issue in report.warnings() {
        eprintln!("{} {}", style("warning:").yellow().bold(), issue);
    }

    Ok(Retriever::new(
        vector_store,
        Arc::new(client.clone()),
        config.retrieval.top_k,
    ))
}

async fn open_assistant(
    config: &Config,
    client: OllamaClient,
    show_sources: bool,
) -> Result<Assistant<OllamaClient>> {
    let retriever = open_retriever(config, &client).await?;

    Ok(Assistant::new(retriever, client).with_sources(show_sources))
}

/// Embed the dataset and replace the persisted index
#[inline]
pub async fn build_index(base_dir: &Path, dataset: Option<PathBuf>) -> Result<()> {
    let config = load_config(base_dir)?;
    let dataset_path = dataset.unwrap_or_else(|| config.dataset_path());

    let client = create_client(&config)?;
    client
        .ping()
        .map_err(|e| RagError::Embedding(format!("Ollama is not reachable: {:#}", e)))?;

    println!("Building index from {}", dataset_path.display());

    let report = IndexBuilder::new(config.clone(), Arc::new(client))
        .build(&dataset_path)
        .await?;

    println!("{}", style("Index built successfully!").green().bold());
    println!("  Build ID: {}", report.build_id);
    println!("  Records: {}", report.records);
    println!("  Entries: {}", report.entries);
    println!("  Records split into chunks: {}", report.chunked_records);
    if report.skipped > 0 {
        println!("  Skipped entries: {}", report.skipped);
    }
    println!("  Dataset hash: {}", report.dataset_hash);
    println!("  Duration: {:.1}s", report.elapsed.as_secs_f64());
    println!("  Index directory: {}", config.index_dir().display());

    Ok(())
}

/// Interactive chat in the terminal
#[inline]
pub async fn run_chat(base_dir: &Path) -> Result<()> {
    let config = load_config(base_dir)?;
    let client = create_client(&config)?;

    if let Err(e) = client.health_check() {
        warn!("Ollama health check failed: {:#}", e);
        eprintln!(
            "{} Ollama health check failed: {:#}",
            style("warning:").yellow().bold(),
            e
        );
    }

    println!(
        "{}",
        style("Type 'exit' or 'quit' (or press Ctrl-D) to leave.").dim()
    );

    let mut transport = TerminalTransport::new();
    let stats = start_chat(
        &mut transport,
        open_assistant(&config, client, config.retrieval.show_sources),
    )
    .await?;

    info!(
        "Chat finished after {} answers ({} failed)",
        stats.answered, stats.failed
    );
    println!("Beslama!");
    Ok(())
}

/// Answer one question and print the result
#[inline]
pub async fn ask(base_dir: &Path, question: &str, show_sources: bool) -> Result<()> {
    let config = load_config(base_dir)?;
    let client = create_client(&config)?;
    let assistant = open_assistant(
        &config,
        client,
        show_sources || config.retrieval.show_sources,
    )
    .await?;

    let answer = assistant.answer(question).await?;
    println!("{}", answer.render(assistant.shows_sources()));

    Ok(())
}

/// Print the entries nearest to `query` without generating an answer
#[inline]
pub async fn search(base_dir: &Path, query: &str, k: Option<usize>) -> Result<()> {
    let config = load_config(base_dir)?;
    let client = create_client(&config)?;
    let retriever = open_retriever(&config, &client).await?;

    let k = k.unwrap_or_else(|| retriever.top_k());
    let hits = retriever.retrieve_k(query, k).await?;

    if hits.is_empty() {
        println!("No entries found.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{} record {} chunk {} (distance {:.4}, similarity {:.3})",
            style(format!("#{}", rank + 1)).cyan().bold(),
            hit.metadata.record_index,
            hit.metadata.chunk_index,
            hit.distance,
            hit.similarity_score
        );
        if !hit.metadata.category.is_empty() {
            println!("   Category: {}", hit.metadata.category);
        }
        for line in hit.metadata.content.lines() {
            println!("   {}", line);
        }
        println!();
    }

    Ok(())
}

fn print_consistency(report: &ConsistencyReport) {
    println!("🔍 Index Consistency:");
    if report.is_consistent {
        println!("   ✅ {}", report.summary());
        return;
    }

    for issue in &report.issues {
        if issue.is_fatal() {
            println!("   ❌ {}", issue);
        } else {
            println!("   ⚠️  {}", issue);
        }
    }
}

/// Show the build manifest, store contents and service health
#[inline]
pub async fn show_status(base_dir: &Path) -> Result<()> {
    let config = load_config(base_dir).unwrap_or_else(|e| {
        warn!("Using default configuration: {}", e);
        Config {
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        }
    });

    println!("📊 Morocco RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match create_client(&config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
        },
        Err(e) => println!("   ❌ Ollama: {}", e),
    }
    println!("   📋 Embedding model: {}", config.ollama.embedding_model);
    println!("   💬 Chat model: {}", config.generation.model);
    println!();

    println!("🗄️  Index ({}):", config.index_dir().display());
    if !config.database_path().exists() {
        println!("   💤 No index has been built yet");
        println!("   Run `morocco-rag build` to create it");
        return Ok(());
    }

    let database = open_database(&config).await?;
    let vector_store = VectorStore::open(&config.vector_database_path()).await?;

    match database
        .latest_manifest()
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))?
    {
        Some(manifest) => {
            println!("   🆔 Build: {}", manifest.build_id);
            println!(
                "   📅 Built: {}",
                manifest.built_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("   📄 Dataset: {}", manifest.dataset_path);
            println!(
                "   🧮 Embeddings: {} ({} dimensions)",
                manifest.embedding_model, manifest.embedding_dimension
            );
            println!(
                "   ✂️  Chunking: size {} / overlap {}",
                manifest.chunk_size, manifest.chunk_overlap
            );
        }
        None => println!("   💤 No index has been built yet"),
    }

    let records = database
        .count_records()
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))?;
    let chunked = database
        .count_chunked_records()
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))?;
    println!("   📊 Records: {} ({} split into chunks)", records, chunked);
    println!("   📊 Entries: {}", vector_store.count_entries().await?);

    let categories = database
        .category_counts()
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))?;
    if !categories.is_empty() {
        println!();
        println!("🏷️  Categories:");
        for category in &categories {
            println!("   {:<24} {}", category.category, category.count);
        }
    }

    println!();
    let report = ConsistencyChecker::new(&database, &vector_store)
        .check(&config, &config.ollama.embedding_model)
        .await?;
    print_consistency(&report);

    Ok(())
}
