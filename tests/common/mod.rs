//! Helpers shared by the integration tests

#![allow(dead_code, reason = "not every test file uses every helper")]

use std::fs;
use std::path::PathBuf;

use morocco_rag::config::{Config, OllamaConfig};
use morocco_rag::embeddings::Embedder;
use tempfile::TempDir;

pub const TEST_DIMENSION: u32 = 64;

/// Bag-of-words embedder: every lowercase word is hashed into one of `dimension` buckets
/// and the result is scaled to unit length. Identical texts get identical vectors.
pub struct HashingEmbedder {
    name: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: u32) -> Self {
        Self::named("hashing-embedder", dimension)
    }

    pub fn named(name: &str, dimension: u32) -> Self {
        Self {
            name: name.to_string(),
            dimension: dimension as usize,
        }
    }
}

fn bucket(word: &str, dimension: usize) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % dimension as u64) as usize
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            vector[bucket(&word.to_lowercase(), self.dimension)] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

pub fn create_test_config(temp_dir: &TempDir) -> Config {
    Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            embedding_model: "hashing-embedder".to_string(),
            embedding_dimension: TEST_DIMENSION,
            batch_size: 4,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

/// Write `json` to the configured dataset location
pub fn write_dataset(config: &Config, json: &str) -> PathBuf {
    let path = config.dataset_path();
    fs::write(&path, json).expect("should write dataset");
    path
}

pub const TOURISM_DATASET: &str = r#"[
    {"instruction": "What is the best time to visit Marrakech?", "output": "Spring, from March to May, when days are warm and nights are cool.", "category": "travel_tips"},
    {"instruction": "How do I get from Fez to Chefchaouen?", "output": "CTM buses leave Fez several times a day and take about four hours.", "category": "transport"},
    {"instruction": "Where can I surf in Morocco?", "output": "Taghazout and Imsouane have reliable waves and surf schools.", "category": "activities"},
    {"instruction": "What should I eat in Morocco?", "output": "Try tagine, couscous on Friday, pastilla and mint tea.", "category": "food"},
    {"instruction": "Is a desert tour from Merzouga worth it?", "output": "Yes, a camel trek into Erg Chebbi with a night in a camp is memorable.", "category": "activities"}
]"#;
