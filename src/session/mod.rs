//! Chat session: document cache, model selection and transcript.
//!
//! One session owns a map of built query pipelines keyed by document
//! identity, scoped to the currently active chat model. Switching to a
//! different model invalidates every cached pipeline and the stored
//! vectors behind them; repeating an upload under the same model is a
//! cache hit that touches neither disk nor the embedding backend.

pub mod pipeline;
pub mod prompt;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::settings::IndexingSettings;
use crate::core::errors::ChatError;
use crate::index::{DocumentChunk, SplitterConfig, TextSplitter, VectorStore};
use crate::llm::{LlmProvider, ModelCatalog, ModelOption};
use crate::loader::DocumentLoader;

pub use pipeline::QueryPipeline;
pub use prompt::QaPromptTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl TranscriptMessage {
    fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome of a model selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSwitch {
    /// The requested model was already active; the cache is untouched.
    Unchanged,
    /// A different model is now active; every cached pipeline was dropped.
    Invalidated { dropped: usize },
}

/// Result of indexing a document into the session.
pub struct IndexOutcome {
    pub pipeline: Arc<QueryPipeline>,
    /// True when the pipeline came straight out of the cache.
    pub cached: bool,
}

impl std::fmt::Debug for IndexOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexOutcome")
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

/// Session-scoped state for one connected client.
pub struct ChatSession {
    id: String,
    catalog: ModelCatalog,
    active_model: ModelOption,
    embedding_model: String,
    top_k: usize,
    splitter: TextSplitter,
    template: QaPromptTemplate,
    provider: Arc<dyn LlmProvider>,
    loader: Arc<dyn DocumentLoader>,
    store: Arc<dyn VectorStore>,
    pipelines: HashMap<String, Arc<QueryPipeline>>,
    current_document: Option<String>,
    transcript: Arc<Mutex<Vec<TranscriptMessage>>>,
    stream_gate: Arc<Semaphore>,
}

impl ChatSession {
    pub fn new(
        catalog: ModelCatalog,
        embedding_model: impl Into<String>,
        indexing: &IndexingSettings,
        provider: Arc<dyn LlmProvider>,
        loader: Arc<dyn DocumentLoader>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let active_model = catalog.default_option().clone();
        Self {
            id: Uuid::new_v4().to_string(),
            catalog,
            active_model,
            embedding_model: embedding_model.into(),
            top_k: indexing.top_k,
            splitter: TextSplitter::new(SplitterConfig::from(indexing)),
            template: QaPromptTemplate::default(),
            provider,
            loader,
            store,
            pipelines: HashMap::new(),
            current_document: None,
            transcript: Arc::new(Mutex::new(Vec::new())),
            stream_gate: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn active_model(&self) -> &ModelOption {
        &self.active_model
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn current_document(&self) -> Option<&str> {
        self.current_document.as_deref()
    }

    /// Number of documents with a built pipeline under the active model.
    pub fn cached_documents(&self) -> usize {
        self.pipelines.len()
    }

    /// Cached pipeline for a document, if one was built.
    pub fn pipeline(&self, document: &str) -> Option<Arc<QueryPipeline>> {
        self.pipelines.get(document).cloned()
    }

    pub fn transcript(&self) -> Vec<TranscriptMessage> {
        lock(&self.transcript).clone()
    }

    /// Switch the active chat model. Selecting the already-active model is
    /// a no-op; any other catalog entry wipes the session's stored chunks
    /// first and then drops every cached pipeline, so a failed wipe leaves
    /// the old model fully usable.
    pub async fn select_model(&mut self, label: &str) -> Result<ModelSwitch, ChatError> {
        let option = self.catalog.resolve(label)?.clone();
        if option.label == self.active_model.label {
            debug!("Model {} already active", option.label);
            return Ok(ModelSwitch::Unchanged);
        }

        self.store.clear_session(&self.id).await?;
        let dropped = self.pipelines.len();
        self.pipelines.clear();
        self.current_document = None;

        info!(
            "Model switched to {} ({}), dropped {} cached pipeline(s)",
            option.label, option.model, dropped
        );
        self.active_model = option;
        Ok(ModelSwitch::Invalidated { dropped })
    }

    /// Index an uploaded document, or return the cached pipeline when the
    /// same document was already indexed under the active model.
    ///
    /// The bytes are written to a scoped temp directory so the loader sees
    /// a real file; the directory is removed when this call returns,
    /// success or not. No cache entry is created on failure.
    pub async fn index_document(
        &mut self,
        name: &str,
        bytes: &[u8],
    ) -> Result<IndexOutcome, ChatError> {
        let identity = document_identity(name)?;
        if let Some(pipeline) = self.pipelines.get(&identity) {
            debug!("Cache hit for '{}'", identity);
            self.current_document = Some(identity);
            return Ok(IndexOutcome {
                pipeline: Arc::clone(pipeline),
                cached: true,
            });
        }

        let dir = tempfile::tempdir()
            .map_err(|e| ChatError::Internal(format!("Could not create temp dir: {}", e)))?;
        let file_path = dir.path().join(sanitize_file_name(&identity));
        tokio::fs::write(&file_path, bytes)
            .await
            .map_err(|e| ChatError::Internal(format!("Could not stage upload: {}", e)))?;

        let segments = self.loader.load(&file_path).await?;
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let pipeline = self.build_pipeline(&identity, &text).await?;
        self.pipelines.insert(identity.clone(), Arc::clone(&pipeline));
        self.current_document = Some(identity);
        Ok(IndexOutcome {
            pipeline,
            cached: false,
        })
    }

    /// Index pre-fetched text (a downloaded web page) under the given name.
    pub async fn index_text(&mut self, name: &str, text: &str) -> Result<IndexOutcome, ChatError> {
        let identity = document_identity(name)?;
        if let Some(pipeline) = self.pipelines.get(&identity) {
            debug!("Cache hit for '{}'", identity);
            self.current_document = Some(identity);
            return Ok(IndexOutcome {
                pipeline: Arc::clone(pipeline),
                cached: true,
            });
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Load(format!(
                "No extractable content in {}",
                identity
            )));
        }

        let pipeline = self.build_pipeline(&identity, trimmed).await?;
        self.pipelines.insert(identity.clone(), Arc::clone(&pipeline));
        self.current_document = Some(identity);
        Ok(IndexOutcome {
            pipeline,
            cached: false,
        })
    }

    /// Chunk, embed and store one document, then bind the query pipeline.
    /// The store insert is the last fallible step, so a failure anywhere
    /// leaves no cache entry and no stray chunks.
    async fn build_pipeline(
        &self,
        identity: &str,
        text: &str,
    ) -> Result<Arc<QueryPipeline>, ChatError> {
        let chunks = self.splitter.split(text, identity);
        if chunks.is_empty() {
            return Err(ChatError::Load(format!("No indexable text in {}", identity)));
        }

        let inputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .provider
            .embed(&inputs, &self.embedding_model)
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(ChatError::Index(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let items: Vec<(DocumentChunk, Vec<f32>)> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                (
                    DocumentChunk {
                        chunk_id: Uuid::new_v4().to_string(),
                        session_id: self.id.clone(),
                        source: identity.to_string(),
                        content: chunk.text,
                        start_offset: chunk.start_offset as i64,
                        chunk_index: chunk.chunk_index as i64,
                    },
                    embedding,
                )
            })
            .collect();

        let chunk_count = items.len();
        self.store.insert_batch(items).await?;
        info!("Indexed '{}': {} chunk(s)", identity, chunk_count);

        Ok(Arc::new(QueryPipeline {
            session_id: self.id.clone(),
            source: identity.to_string(),
            model: self.active_model.model.clone(),
            embedding_model: self.embedding_model.clone(),
            top_k: self.top_k,
            chunk_count,
            template: self.template.clone(),
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
        }))
    }

    /// Start answering a question about the current document.
    ///
    /// Appends the user message to the transcript up front; the returned
    /// `AnswerStream` commits the assistant reply when the stream finishes
    /// and rolls the transcript back if it errors or is dropped unconsumed.
    pub async fn answer(&self, query: &str) -> Result<AnswerStream, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::Config("Message must not be empty".to_string()));
        }

        let pipeline = self
            .current_document
            .as_ref()
            .and_then(|doc| self.pipelines.get(doc))
            .cloned()
            .ok_or_else(|| {
                ChatError::Config("No document has been indexed yet".to_string())
            })?;

        let permit = Arc::clone(&self.stream_gate)
            .try_acquire_owned()
            .map_err(|_| ChatError::Busy)?;

        let baseline = {
            let mut transcript = lock(&self.transcript);
            let baseline = transcript.len();
            transcript.push(TranscriptMessage::now(Role::User, query));
            baseline
        };

        match pipeline.query_stream(query).await {
            Ok(rx) => Ok(AnswerStream {
                rx,
                transcript: Arc::clone(&self.transcript),
                baseline,
                collected: String::new(),
                settled: false,
                _permit: permit,
            }),
            Err(e) => {
                rollback(&self.transcript, baseline);
                Err(e)
            }
        }
    }

    /// Clear the transcript. The pipeline cache is untouched.
    pub fn reset_conversation(&self) -> usize {
        let mut transcript = lock(&self.transcript);
        let removed = transcript.len();
        transcript.clear();
        removed
    }

    /// Drop the session's stored chunks. Called when the client goes away.
    pub async fn close(self) -> Result<usize, ChatError> {
        self.store.clear_session(&self.id).await
    }
}

/// Live answer stream for one question.
///
/// Yields fragments in arrival order. Fully consuming a successful stream
/// appends the assistant message; an error or an early drop rolls the
/// transcript back to its pre-question state. The owned semaphore permit
/// keeps the session rejecting concurrent answers until this drops.
#[derive(Debug)]
pub struct AnswerStream {
    rx: mpsc::Receiver<Result<String, ChatError>>,
    transcript: Arc<Mutex<Vec<TranscriptMessage>>>,
    baseline: usize,
    collected: String,
    settled: bool,
    _permit: OwnedSemaphorePermit,
}

impl AnswerStream {
    /// Next text fragment, `None` once the answer is complete. The first
    /// returned error ends the stream.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ChatError>> {
        if self.settled {
            return None;
        }

        match self.rx.recv().await {
            Some(Ok(fragment)) => {
                self.collected.push_str(&fragment);
                Some(Ok(fragment))
            }
            Some(Err(e)) => {
                self.settled = true;
                rollback(&self.transcript, self.baseline);
                Some(Err(e))
            }
            None => {
                self.settled = true;
                let mut transcript = lock(&self.transcript);
                transcript.push(TranscriptMessage::now(
                    Role::Assistant,
                    std::mem::take(&mut self.collected),
                ));
                None
            }
        }
    }
}

impl Drop for AnswerStream {
    fn drop(&mut self) {
        if !self.settled {
            rollback(&self.transcript, self.baseline);
        }
    }
}

fn lock(transcript: &Mutex<Vec<TranscriptMessage>>) -> MutexGuard<'_, Vec<TranscriptMessage>> {
    transcript.lock().unwrap_or_else(|e| e.into_inner())
}

fn rollback(transcript: &Mutex<Vec<TranscriptMessage>>, baseline: usize) {
    let mut transcript = lock(transcript);
    if transcript.len() > baseline {
        transcript.truncate(baseline);
    }
}

/// Document identity is the trimmed client-supplied name.
fn document_identity(name: &str) -> Result<String, ChatError> {
    let identity = name.trim();
    if identity.is_empty() {
        return Err(ChatError::Config(
            "Document name must not be empty".to_string(),
        ));
    }
    Ok(identity.to_string())
}

/// File name for staging an upload on disk. Keeps the extension so the
/// loader can detect HTML, neutralizes path separators.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "document.txt".to_string()
    } else {
        cleaned
    }
}
