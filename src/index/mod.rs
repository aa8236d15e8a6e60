//! Document indexing: chunk splitting and vector storage.

pub mod splitter;
pub mod sqlite;
pub mod store;

pub use splitter::{SplitterConfig, TextChunk, TextSplitter};
pub use sqlite::SqliteVectorStore;
pub use store::{ChunkMatch, DocumentChunk, VectorStore};
