//! VectorStore trait and chunk storage types.
//!
//! Provides the storage half of the embed-and-index capability: chunks
//! are inserted with their vectors and retrieved by similarity, scoped
//! to one session and one document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ChatError;

/// A stored document chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique chunk identifier.
    pub chunk_id: String,
    /// Session that owns this chunk.
    pub session_id: String,
    /// Document identity the chunk came from.
    pub source: String,
    /// The text content of the chunk.
    pub content: String,
    /// Character offset in the original document.
    pub start_offset: i64,
    /// Chunk index within the source.
    pub chunk_index: i64,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub chunk: DocumentChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Abstract trait for chunk storage backends.
///
/// Implementations must make `insert_batch` atomic: either every chunk
/// of a document lands or none does.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embedding vectors, atomically.
    async fn insert_batch(&self, items: Vec<(DocumentChunk, Vec<f32>)>) -> Result<(), ChatError>;

    /// Search chunks of one session+document by similarity to the query
    /// embedding, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        session_id: &str,
        source: &str,
    ) -> Result<Vec<ChunkMatch>, ChatError>;

    /// Delete all chunks for a session. Returns the number removed.
    async fn clear_session(&self, session_id: &str) -> Result<usize, ChatError>;

    /// Total chunk count, optionally scoped to a session.
    async fn count(&self, session_id: Option<&str>) -> Result<usize, ChatError>;
}
