//! QA prompt assembly.
//!
//! Renders retrieved chunks and the user's question into the single-turn
//! prompt handed to the chat model.

use crate::index::ChunkMatch;

/// Default instruction block. The model is told to answer from the
/// supplied context only and to admit when it cannot.
pub const DEFAULT_QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information above, think step by step to answer the query \
in a crisp manner. If you don't know the answer, say 'I don't know!'.\n\
Query: {query}\n\
Answer: ";

/// Prompt template with `{context}` and `{query}` placeholders.
#[derive(Debug, Clone)]
pub struct QaPromptTemplate {
    template: String,
}

impl QaPromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, context: &str, query: &str) -> String {
        self.template
            .replace("{context}", context)
            .replace("{query}", query)
    }
}

impl Default for QaPromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_QA_TEMPLATE)
    }
}

/// Join retrieved chunks into one context block, best match first.
pub fn build_context(matches: &[ChunkMatch]) -> String {
    matches
        .iter()
        .map(|m| m.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
