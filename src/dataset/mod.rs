// Dataset module
// Loads the deduplicated tourism dataset that the index is built from


use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// Source tag given to records that do not name one
pub const DEFAULT_SOURCE: &str = "morocco_tourism_dataset";

/// One question/answer unit about Moroccan tourism
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Position of the record among the kept records of the dataset
    pub record_index: usize,
    pub instruction: String,
    pub input: String,
    pub output: String,
    pub category: String,
    pub source: String,
}

/// Entry shape as it appears in the JSON file; every field is optional
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// The ordered records of one dataset file together with the digest of its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub path: PathBuf,
    /// SHA-256 of the file contents, hex encoded
    pub content_hash: String,
    pub records: Vec<Record>,
    /// Entries dropped because they were malformed or empty
    pub skipped: usize,
}

impl Record {
    /// Searchable text combining every field of the record
    #[inline]
    pub fn content(&self) -> String {
        format!(
            "Instruction: {}\nInput: {}\nOutput: {}\nCategory: {}",
            self.instruction, self.input, self.output, self.category
        )
    }

    /// A record without instruction, input and output carries nothing worth retrieving
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.instruction.trim().is_empty()
            && self.input.trim().is_empty()
            && self.output.trim().is_empty()
    }
}

impl Dataset {
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load the dataset at `path`.
///
/// The file must hold a JSON array of objects with string fields. Malformed or empty
/// entries abort the load unless `skip_invalid` is set, in which case they are logged and
/// dropped. Identical entries are kept as independent records.
#[inline]
pub fn load_dataset(path: &Path, skip_invalid: bool) -> Result<Dataset> {
    debug!("Loading dataset from {}", path.display());

    let bytes = fs::read(path).map_err(|e| {
        RagError::Dataset(format!("Failed to read dataset {}: {}", path.display(), e))
    })?;
    let content_hash = hash_bytes(&bytes);

    let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
        RagError::Dataset(format!(
            "Dataset {} is not valid JSON: {}",
            path.display(),
            e
        ))
    })?;

    let Value::Array(entries) = value else {
        return Err(RagError::Dataset(format!(
            "Dataset {} must contain a JSON array of records",
            path.display()
        )));
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for (position, entry) in entries.into_iter().enumerate() {
        let problem = match serde_json::from_value::<RawRecord>(entry) {
            Ok(raw) => {
                let record = raw.into_record(records.len());
                if record.is_blank() {
                    format!("entry {} has no instruction, input or output", position)
                } else {
                    records.push(record);
                    continue;
                }
            }
            Err(e) => format!("entry {} is malformed: {}", position, e),
        };

        if !skip_invalid {
            return Err(RagError::Dataset(format!(
                "{} in {}",
                problem,
                path.display()
            )));
        }

        warn!("Skipping dataset {}", problem);
        skipped += 1;
    }

    info!(
        "Loaded {} records from {} ({} skipped)",
        records.len(),
        path.display(),
        skipped
    );

    Ok(Dataset {
        path: path.to_path_buf(),
        content_hash,
        records,
        skipped,
    })
}

/// SHA-256 digest of a file, hex encoded
#[inline]
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl RawRecord {
    fn into_record(self, record_index: usize) -> Record {
        Record {
            record_index,
            instruction: self.instruction.unwrap_or_default(),
            input: self.input.unwrap_or_default(),
            output: self.output.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            source: self
                .source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        }
    }
}
