
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::dataset::Record;

/// Separators tried in order; the empty separator splits between characters
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Represents a chunk of record text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Index of the record this chunk was cut from
    pub record_index: usize,
    /// The index of this chunk within its record
    pub chunk_index: usize,
    /// The content text
    pub content: String,
    /// Length of the content in characters
    pub char_count: usize,
}

/// Configuration for record chunking. Sizes are measured in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Records longer than this are split into several chunks
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks of the same record
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Split a record's content into embedding-ready chunks that keep a reference to the record
#[inline]
pub fn chunk_record(record: &Record, config: &ChunkingConfig) -> Vec<TextChunk> {
    let chunks: Vec<TextChunk> = split_text(&record.content(), config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| TextChunk {
            record_index: record.record_index,
            chunk_index,
            char_count: char_len(&content),
            content,
        })
        .collect();

    if chunks.len() > 1 {
        debug!(
            "Split record {} into {} chunks (avg {} tokens)",
            record.record_index,
            chunks.len(),
            chunks
                .iter()
                .map(|c| estimate_token_count(&c.content))
                .sum::<usize>()
                / chunks.len()
        );
    }

    chunks
}

/// Split text recursively on paragraph, line, word and finally character boundaries.
///
/// Text that already fits in `chunk_size` is returned unchanged as a single chunk.
/// Every produced chunk is at most `chunk_size` characters long and adjacent chunks
/// share up to `chunk_overlap` characters of whole pieces.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    if char_len(text) <= config.chunk_size {
        return vec![text.to_string()];
    }

    split_recursive(text, &SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let position = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(*s))
        .unwrap_or(separators.len());
    let separator = separators.get(position).copied().unwrap_or("");
    let remaining = separators.get(position + 1..).unwrap_or(&[]);

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut chunks = Vec::new();
    let mut fitting: Vec<String> = Vec::new();

    for piece in pieces {
        if char_len(&piece) <= config.chunk_size {
            fitting.push(piece);
            continue;
        }

        if !fitting.is_empty() {
            chunks.extend(merge_pieces(&fitting, separator, config));
            fitting.clear();
        }

        if remaining.is_empty() {
            chunks.push(piece);
        } else {
            chunks.extend(split_recursive(&piece, remaining, config));
        }
    }

    if !fitting.is_empty() {
        chunks.extend(merge_pieces(&fitting, separator, config));
    }

    chunks
}

/// Greedily join pieces into chunks, carrying trailing pieces over as overlap
fn merge_pieces(pieces: &[String], separator: &str, config: &ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for piece in pieces {
        let piece_len = char_len(piece);
        let joined_len = |window: &VecDeque<&str>, total: usize| {
            total + piece_len + if window.is_empty() { 0 } else { separator_len }
        };

        if !window.is_empty() && joined_len(&window, total) > config.chunk_size {
            push_joined(&mut chunks, &window, separator);

            while total > config.chunk_overlap
                || (total > 0 && joined_len(&window, total) > config.chunk_size)
            {
                let Some(front) = window.pop_front() else {
                    break;
                };
                let removed = char_len(front) + if window.is_empty() { 0 } else { separator_len };
                total = total.saturating_sub(removed);
            }
        }

        if !window.is_empty() {
            total += separator_len;
        }
        total += piece_len;
        window.push_back(piece);
    }

    push_joined(&mut chunks, &window, separator);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
