//! Built query pipeline for one indexed document.
//!
//! A `QueryPipeline` is the cached product of indexing: embedding config,
//! the searchable index reference, the prompt template, retrieval depth
//! and the generation model, bound together. Sessions hand out `Arc`
//! handles; the cache stays the owner of record.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::errors::ChatError;
use crate::index::VectorStore;
use crate::llm::{ChatMessage, GenerationRequest, LlmProvider};

use super::prompt::{build_context, QaPromptTemplate};

pub struct QueryPipeline {
    pub(crate) session_id: String,
    pub(crate) source: String,
    pub(crate) model: String,
    pub(crate) embedding_model: String,
    pub(crate) top_k: usize,
    pub(crate) chunk_count: usize,
    pub(crate) template: QaPromptTemplate,
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) store: Arc<dyn VectorStore>,
}

impl QueryPipeline {
    /// Document identity this pipeline answers for.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Generation model the pipeline is bound to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of chunks indexed for the document.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Run one retrieval-augmented query: embed the question, search the
    /// session's chunks for this document, render the QA prompt and start
    /// a streamed generation.
    pub async fn query_stream(
        &self,
        query: &str,
    ) -> Result<mpsc::Receiver<Result<String, ChatError>>, ChatError> {
        info!(
            "Querying '{}' with model {} (top_k={})",
            self.source, self.model, self.top_k
        );

        let embeddings = self
            .provider
            .embed(&[query.to_string()], &self.embedding_model)
            .await?;
        let query_embedding = embeddings.into_iter().next().ok_or_else(|| {
            ChatError::Index("Embedding backend returned no vector for the query".to_string())
        })?;

        let matches = self
            .store
            .search(&query_embedding, self.top_k, &self.session_id, &self.source)
            .await?;
        debug!("Retrieved {} chunk(s) for the query", matches.len());

        let context = build_context(&matches);
        let prompt = self.template.render(&context, query);

        let request = GenerationRequest::new(vec![ChatMessage::user(prompt)]);
        self.provider.stream_chat(request, &self.model).await
    }
}
