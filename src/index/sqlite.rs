//! SQLite-backed vector store implementation.
//!
//! In-process store using SQLite for chunk rows and brute-force cosine
//! similarity for search. Embeddings are kept as little-endian f32
//! blobs alongside the chunk text.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkMatch, DocumentChunk, VectorStore};
use crate::core::config::AppPaths;
use crate::core::errors::ChatError;

/// Store failures are index errors from the caller's point of view.
fn db_err(err: sqlx::Error) -> ChatError {
    ChatError::Index(format!("Vector store error: {}", err))
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ChatError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ChatError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ChatError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS document_chunks (
                chunk_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                start_offset INTEGER NOT NULL DEFAULT 0,
                chunk_index INTEGER NOT NULL DEFAULT 0,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_session_source
             ON document_chunks(session_id, source)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> DocumentChunk {
        DocumentChunk {
            chunk_id: row.get("chunk_id"),
            session_id: row.get("session_id"),
            source: row.get("source"),
            content: row.get("content"),
            start_offset: row.get("start_offset"),
            chunk_index: row.get("chunk_index"),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_batch(&self, items: Vec<(DocumentChunk, Vec<f32>)>) -> Result<(), ChatError> {
        if items.is_empty() {
            return Ok(());
        }

        // All vectors of a batch must share one non-zero dimension;
        // mixed dimensions would silently score as 0.0 later.
        let dim = items[0].1.len();
        if dim == 0 || items.iter().any(|(_, emb)| emb.len() != dim) {
            return Err(ChatError::Index(
                "Embedding batch has inconsistent dimensions".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);

            sqlx::query(
                "INSERT OR REPLACE INTO document_chunks
                 (chunk_id, session_id, source, content, start_offset, chunk_index, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.session_id)
            .bind(&chunk.source)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.chunk_index)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        session_id: &str,
        source: &str,
    ) -> Result<Vec<ChunkMatch>, ChatError> {
        let rows = sqlx::query(
            "SELECT chunk_id, session_id, source, content, start_offset, chunk_index, embedding
             FROM document_chunks
             WHERE session_id = ?1 AND source = ?2",
        )
        .bind(session_id)
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut scored: Vec<ChunkMatch> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(query_embedding, &stored_emb);

                Some(ChunkMatch {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit.max(1));

        Ok(scored)
    }

    async fn clear_session(&self, session_id: &str) -> Result<usize, ChatError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, session_id: Option<&str>) -> Result<usize, ChatError> {
        let count: i64 = if let Some(session_id) = session_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE session_id = ?1")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?
        };

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!("docchat-index-test-{}.db", uuid::Uuid::new_v4()));
        SqliteVectorStore::with_path(tmp).await.unwrap()
    }

    fn make_chunk(id: &str, content: &str, session: &str, source: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id.to_string(),
            session_id: session.to_string(),
            source: source.to_string(),
            content: content.to_string(),
            start_offset: 0,
            chunk_index: 0,
        }
    }

    #[tokio::test]
    async fn insert_and_search_scoped_to_document() {
        let store = test_store().await;

        store
            .insert_batch(vec![
                (make_chunk("c1", "Hello world", "s1", "a.txt"), vec![1.0, 0.0, 0.0]),
                (make_chunk("c2", "Goodbye moon", "s1", "b.txt"), vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count(None).await.unwrap(), 2);

        let results = store.search(&[1.0, 0.0, 0.0], 10, "s1", "a.txt").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "c1");
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let store = test_store().await;

        store
            .insert_batch(vec![
                (make_chunk("far", "far", "s1", "doc"), vec![0.0, 1.0]),
                (make_chunk("near", "near", "s1", "doc"), vec![1.0, 0.1]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 1, "s1", "doc").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "near");
    }

    #[tokio::test]
    async fn mixed_dimension_batch_is_rejected() {
        let store = test_store().await;

        let err = store
            .insert_batch(vec![
                (make_chunk("c1", "a", "s1", "doc"), vec![1.0, 0.0]),
                (make_chunk("c2", "b", "s1", "doc"), vec![1.0]),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Index(_)));
        // The failed batch must leave nothing behind.
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_session_removes_only_that_session() {
        let store = test_store().await;

        store
            .insert_batch(vec![
                (make_chunk("c1", "data", "s1", "doc"), vec![1.0]),
                (make_chunk("c2", "data", "s2", "doc"), vec![1.0]),
            ])
            .await
            .unwrap();

        let deleted = store.clear_session("s1").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.count(Some("s2")).await.unwrap(), 1);
    }
}
