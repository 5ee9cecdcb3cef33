// Assistant module
// Retrieves the closest dataset entries for a question and asks the chat model to answer from them


pub mod prompt;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info};

use crate::database::lancedb::{SearchHit, VectorStore};
use crate::embeddings::{Embedder, Generator};
use crate::{RagError, Result};

pub use prompt::PromptTemplate;

/// Finds the index entries nearest to a query
pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

/// A cleaned answer together with the entries it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SearchHit>,
}

/// Retrieval, prompt assembly and generation for one question at a time
pub struct Assistant<G: Generator> {
    retriever: Retriever,
    generator: G,
    template: PromptTemplate,
    show_sources: bool,
}

impl Retriever {
    /// `embedder` must be the model the index was built with
    #[inline]
    pub fn new(store: VectorStore, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
        }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Up to `top_k` entries closest to `query`, nearest first
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.retrieve_k(query, self.top_k).await
    }

    /// Like [`Retriever::retrieve`] with an explicit result count
    #[inline]
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        // Only blank-checked; the query is embedded as given
        if query.trim().is_empty() {
            return Err(RagError::Query("query is empty".to_string()));
        }

        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| RagError::Embedding(format!("Failed to embed query: {:#}", e)))?;

        let hits = self.store.search(&vector, k).await?;
        debug!("Retrieved {} entries for query", hits.len());

        Ok(hits)
    }
}

impl<G: Generator> Assistant<G> {
    #[inline]
    pub fn new(retriever: Retriever, generator: G) -> Self {
        Self {
            retriever,
            generator,
            template: PromptTemplate::default(),
            show_sources: false,
        }
    }

    #[inline]
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Append retrieved entries to chat replies
    #[inline]
    pub fn with_sources(mut self, show_sources: bool) -> Self {
        self.show_sources = show_sources;
        self
    }

    #[inline]
    pub fn shows_sources(&self) -> bool {
        self.show_sources
    }

    /// Answer `question` from the retrieved context
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Query("question is empty".to_string()));
        }

        let hits = self.retriever.retrieve(question).await?;
        let prompt = self.template.render(question, &hits);

        info!(
            "Generating answer from {} retrieved entries (prompt length: {})",
            hits.len(),
            prompt.len()
        );

        let raw = self
            .generator
            .generate(&prompt)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        Ok(Answer {
            text: clean_answer(&raw),
            sources: hits,
        })
    }
}

impl Answer {
    /// Text shown to the user; with `show_sources` the retrieved entries are appended
    #[inline]
    pub fn render(&self, show_sources: bool) -> String {
        if !show_sources {
            return self.text.clone();
        }

        if self.sources.is_empty() {
            return format!("{}\n\n*No specific sources found.*", self.text);
        }

        let mut rendered = format!("{}\n\n**Sources:**\n", self.text);
        for (i, hit) in self.sources.iter().enumerate() {
            if i > 0 {
                rendered.push_str("\n\n");
            }
            let _ = write!(rendered, "Source {}: {}", i + 1, hit.metadata.content);
        }
        rendered
    }
}

/// Trim the model output and drop exact repeats of an earlier non-blank line
#[inline]
pub fn clean_answer(raw: &str) -> String {
    let mut seen = HashSet::new();

    raw.trim()
        .lines()
        .filter(|line| line.trim().is_empty() || seen.insert(*line))
        .collect::<Vec<_>>()
        .join("\n")
}
