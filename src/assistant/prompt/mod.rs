#[cfg(test)]
mod tests;

use itertools::Itertools;

use crate::database::lancedb::SearchHit;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

const DEFAULT_TEMPLATE: &str = "You are an AI assistant specializing in Morocco tourism.
Use the provided context to answer the user's question concisely and coherently. Avoid repetition or adding information not found in the context.

Context: {context}

Question: {question}

Provide a clear and helpful response:
";

/// Instruction text with `{context}` and `{question}` slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    #[inline]
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// A custom template; it must contain both placeholders
    #[inline]
    pub fn new(template: impl Into<String>) -> Option<Self> {
        let template = template.into();
        (template.contains(CONTEXT_PLACEHOLDER) && template.contains(QUESTION_PLACEHOLDER))
            .then_some(Self { template })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill the template; the context is the retrieved entries' text separated by blank lines
    #[inline]
    pub fn render(&self, question: &str, hits: &[SearchHit]) -> String {
        let context = hits.iter().map(|hit| hit.metadata.content.as_str()).join("\n\n");

        // Inserted text is never rescanned for placeholders
        self.template
            .split(CONTEXT_PLACEHOLDER)
            .map(|part| part.replace(QUESTION_PLACEHOLDER, question))
            .join(&context)
    }
}
