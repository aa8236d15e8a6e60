pub mod fetch;
mod html;

use std::path::Path;

use async_trait::async_trait;

use crate::core::errors::ChatError;

pub use fetch::PageFetcher;

/// One contiguous piece of raw text extracted from a document.
#[derive(Debug, Clone)]
pub struct DocumentSegment {
    pub text: String,
}

impl DocumentSegment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Turns a file on disk into raw text segments ready for chunking.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Vec<DocumentSegment>, ChatError>;
}

/// Loader for plain-text formats. HTML files get their markup stripped,
/// everything else is read as UTF-8 verbatim.
pub struct TextDocumentLoader;

#[async_trait]
impl DocumentLoader for TextDocumentLoader {
    async fn load(&self, path: &Path) -> Result<Vec<DocumentSegment>, ChatError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ChatError::Load(format!("Could not read {}: {}", path.display(), e))
        })?;

        let Ok(raw) = String::from_utf8(bytes) else {
            return Err(ChatError::Load(format!(
                "{} is not a text document",
                display_name(path)
            )));
        };

        let text = if is_html(path) {
            html::strip_tags(&raw)
        } else {
            raw
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Load(format!(
                "No extractable content in {}",
                display_name(path)
            )));
        }

        Ok(vec![DocumentSegment::new(trimmed)])
    }
}

fn is_html(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("html") | Some("htm")
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}", uuid::Uuid::new_v4(), name));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_plain_text() {
        let path = temp_file("notes.txt", b"  The quick brown fox.  ");
        let segments = TextDocumentLoader.load(&path).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "The quick brown fox.");
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn strips_markup_from_html_files() {
        let path = temp_file("page.html", b"<html><body><p>Inner text</p></body></html>");
        let segments = TextDocumentLoader.load(&path).await.unwrap();
        assert_eq!(segments[0].text, "Inner text");
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn rejects_binary_content() {
        let path = temp_file("blob.bin", &[0xff, 0xfe, 0x00, 0x01]);
        let err = TextDocumentLoader.load(&path).await.unwrap_err();
        assert!(matches!(err, ChatError::Load(_)));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn rejects_empty_documents() {
        let path = temp_file("empty.txt", b"   \n\t  ");
        let err = TextDocumentLoader.load(&path).await.unwrap_err();
        assert!(matches!(err, ChatError::Load(_)));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let path = std::env::temp_dir().join(format!("{}_gone.txt", uuid::Uuid::new_v4()));
        let err = TextDocumentLoader.load(&path).await.unwrap_err();
        assert!(matches!(err, ChatError::Load(_)));
    }
}
