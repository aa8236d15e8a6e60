//! Behavioral tests for the chat session: cache identity, model-switch
//! invalidation and transcript bookkeeping, driven through scripted
//! seam implementations and a real sqlite store.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::*;
use crate::core::config::settings::IndexingSettings;
use crate::index::SqliteVectorStore;
use crate::llm::GenerationRequest;
use crate::loader::DocumentSegment;

enum Frag {
    Text(&'static str),
    Interrupt,
}

/// Provider that replays a fixed fragment script for every generation
/// and produces deterministic embeddings.
struct ScriptedProvider {
    embed_calls: AtomicUsize,
    script: Vec<Frag>,
    fail_stream_start: bool,
}

impl ScriptedProvider {
    fn answering(fragments: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            embed_calls: AtomicUsize::new(0),
            script: fragments.iter().copied().map(Frag::Text).collect(),
            fail_stream_start: false,
        })
    }

    fn interrupting(prefix: &[&'static str]) -> Arc<Self> {
        let mut script: Vec<Frag> = prefix.iter().copied().map(Frag::Text).collect();
        script.push(Frag::Interrupt);
        Arc::new(Self {
            embed_calls: AtomicUsize::new(0),
            script,
            fail_stream_start: false,
        })
    }

    fn refusing_stream() -> Arc<Self> {
        Arc::new(Self {
            embed_calls: AtomicUsize::new(0),
            script: Vec::new(),
            fail_stream_start: true,
        })
    }

    fn embeds(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, ChatError> {
        Ok(true)
    }

    async fn embed(&self, inputs: &[String], _model: &str) -> Result<Vec<Vec<f32>>, ChatError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs
            .iter()
            .map(|input| vec![input.len() as f32 + 1.0, 1.0])
            .collect())
    }

    async fn stream_chat(
        &self,
        _request: GenerationRequest,
        _model: &str,
    ) -> Result<mpsc::Receiver<Result<String, ChatError>>, ChatError> {
        if self.fail_stream_start {
            return Err(ChatError::Model("backend unavailable".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.script.len().max(1) + 1);
        for frag in &self.script {
            let item = match frag {
                Frag::Text(t) => Ok(t.to_string()),
                Frag::Interrupt => Err(ChatError::Model("stream interrupted".to_string())),
            };
            let _ = tx.send(item).await;
        }
        Ok(rx)
    }
}

/// Loader that serves fixed content and counts how often it runs.
struct CountingLoader {
    calls: AtomicUsize,
    content: &'static str,
}

impl CountingLoader {
    fn with_content(content: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            content,
        })
    }

    fn loads(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentLoader for CountingLoader {
    async fn load(&self, _path: &Path) -> Result<Vec<DocumentSegment>, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![DocumentSegment::new(self.content)])
    }
}

async fn new_session(
    provider: Arc<ScriptedProvider>,
    loader: Arc<CountingLoader>,
) -> (ChatSession, Arc<SqliteVectorStore>) {
    let db_path = std::env::temp_dir().join(format!("docchat_session_{}.db", Uuid::new_v4()));
    let store = Arc::new(SqliteVectorStore::with_path(db_path).await.unwrap());

    let session = ChatSession::new(
        ModelCatalog::default(),
        "nomic-embed-text",
        &IndexingSettings::default(),
        provider,
        loader,
        store.clone(),
    );
    (session, store)
}

#[tokio::test]
async fn repeat_upload_is_a_cache_hit() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("A short report about widgets.");
    let (mut session, store) = new_session(provider.clone(), loader.clone()).await;

    let first = session
        .index_document("report.txt", b"ignored, loader is scripted")
        .await
        .unwrap();
    assert!(!first.cached);
    assert_eq!(loader.loads(), 1);
    assert_eq!(provider.embeds(), 1);
    let stored = store.count(Some(session.id())).await.unwrap();
    assert!(stored > 0);

    let second = session
        .index_document("report.txt", b"ignored, loader is scripted")
        .await
        .unwrap();
    assert!(second.cached);
    assert!(Arc::ptr_eq(&first.pipeline, &second.pipeline));

    // The hit touched neither the loader, the embedder, nor the store.
    assert_eq!(loader.loads(), 1);
    assert_eq!(provider.embeds(), 1);
    assert_eq!(store.count(Some(session.id())).await.unwrap(), stored);
}

#[tokio::test]
async fn selecting_active_model_keeps_cache() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("Some document text.");
    let (mut session, store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();
    let stored = store.count(Some(session.id())).await.unwrap();

    let switch = session.select_model("Phi-3").await.unwrap();
    assert_eq!(switch, ModelSwitch::Unchanged);
    assert_eq!(session.cached_documents(), 1);
    assert_eq!(store.count(Some(session.id())).await.unwrap(), stored);
    assert_eq!(session.current_document(), Some("doc.txt"));
}

#[tokio::test]
async fn switching_model_invalidates_cache_and_store() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("Facts about the fall of Rome.");
    let (mut session, store) = new_session(provider, loader.clone()).await;

    let switch = session.select_model("Llama-3").await.unwrap();
    assert_eq!(switch, ModelSwitch::Invalidated { dropped: 0 });

    let e1 = session.index_document("rome.txt", b"x").await.unwrap();
    assert_eq!(e1.pipeline.model(), "llama3");
    let hit = session.index_document("rome.txt", b"x").await.unwrap();
    assert!(hit.cached);
    assert!(Arc::ptr_eq(&e1.pipeline, &hit.pipeline));

    let switch = session.select_model("Phi-3").await.unwrap();
    assert_eq!(switch, ModelSwitch::Invalidated { dropped: 1 });
    assert_eq!(session.cached_documents(), 0);
    assert_eq!(session.current_document(), None);
    assert_eq!(store.count(Some(session.id())).await.unwrap(), 0);

    // Same document under the new model is a fresh build, not a hit.
    let e2 = session.index_document("rome.txt", b"x").await.unwrap();
    assert!(!e2.cached);
    assert!(!Arc::ptr_eq(&e1.pipeline, &e2.pipeline));
    assert_eq!(e2.pipeline.model(), "phi3");
    assert_eq!(loader.loads(), 2);
}

#[tokio::test]
async fn unknown_model_is_rejected_without_side_effects() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("text");
    let (mut session, store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();
    let stored = store.count(Some(session.id())).await.unwrap();

    let err = session.select_model("GPT-5").await.unwrap_err();
    assert!(matches!(err, ChatError::Config(_)));
    assert_eq!(session.active_model().label, "Phi-3");
    assert_eq!(session.cached_documents(), 1);
    assert_eq!(store.count(Some(session.id())).await.unwrap(), stored);
}

#[tokio::test]
async fn empty_document_fails_without_caching() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("   ");
    let (mut session, store) = new_session(provider, loader).await;

    let err = session.index_document("blank.txt", b"x").await.unwrap_err();
    assert!(matches!(err, ChatError::Load(_)));
    assert_eq!(session.cached_documents(), 0);
    assert_eq!(session.current_document(), None);
    assert_eq!(store.count(Some(session.id())).await.unwrap(), 0);
}

#[tokio::test]
async fn answer_appends_exactly_one_message_pair() {
    let provider = ScriptedProvider::answering(&["The ", "answer."]);
    let loader = CountingLoader::with_content("Document with an answer inside.");
    let (mut session, _store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();

    let mut stream = session.answer("What is this about?").await.unwrap();
    let mut fragments = Vec::new();
    while let Some(result) = stream.next_fragment().await {
        fragments.push(result.unwrap());
    }
    drop(stream);

    assert_eq!(fragments, vec!["The ".to_string(), "answer.".to_string()]);

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, Role::User);
    assert_eq!(transcript[0].content, "What is this about?");
    assert_eq!(transcript[1].role, Role::Assistant);
    assert_eq!(transcript[1].content, "The answer.");
}

#[tokio::test]
async fn mid_stream_error_rolls_back_transcript() {
    let provider = ScriptedProvider::interrupting(&["partial "]);
    let loader = CountingLoader::with_content("Document text.");
    let (mut session, _store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();

    let mut stream = session.answer("question?").await.unwrap();
    assert_eq!(stream.next_fragment().await.unwrap().unwrap(), "partial ");
    let err = stream.next_fragment().await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Model(_)));
    assert!(stream.next_fragment().await.is_none());
    drop(stream);

    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn failed_stream_start_rolls_back_and_frees_the_gate() {
    let provider = ScriptedProvider::refusing_stream();
    let loader = CountingLoader::with_content("Document text.");
    let (mut session, _store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();

    let err = session.answer("question?").await.unwrap_err();
    assert!(matches!(err, ChatError::Model(_)));
    assert!(session.transcript().is_empty());

    // The permit was released: the next failure is Model again, not Busy.
    let err = session.answer("question?").await.unwrap_err();
    assert!(matches!(err, ChatError::Model(_)));
}

#[tokio::test]
async fn dropping_an_unconsumed_answer_rolls_back() {
    let provider = ScriptedProvider::answering(&["never seen"]);
    let loader = CountingLoader::with_content("Document text.");
    let (mut session, _store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();

    {
        let _stream = session.answer("question?").await.unwrap();
    }

    assert!(session.transcript().is_empty());
    assert!(session.answer("retry").await.is_ok());
}

#[tokio::test]
async fn overlapping_answers_are_rejected() {
    let provider = ScriptedProvider::answering(&["slow answer"]);
    let loader = CountingLoader::with_content("Document text.");
    let (mut session, _store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();

    let stream = session.answer("first?").await.unwrap();
    let err = session.answer("second?").await.unwrap_err();
    assert!(matches!(err, ChatError::Busy));

    drop(stream);
    assert!(session.answer("third?").await.is_ok());
}

#[tokio::test]
async fn answer_requires_an_indexed_document() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("text");
    let (session, _store) = new_session(provider, loader).await;

    let err = session.answer("anything there?").await.unwrap_err();
    assert!(matches!(err, ChatError::Config(_)));
}

#[tokio::test]
async fn blank_queries_are_rejected() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("Document text.");
    let (mut session, _store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();

    let err = session.answer("   ").await.unwrap_err();
    assert!(matches!(err, ChatError::Config(_)));
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn reset_clears_transcript_but_not_cache() {
    let provider = ScriptedProvider::answering(&["done"]);
    let loader = CountingLoader::with_content("Document text.");
    let (mut session, _store) = new_session(provider, loader).await;

    session.index_document("doc.txt", b"x").await.unwrap();
    let mut stream = session.answer("question?").await.unwrap();
    while stream.next_fragment().await.is_some() {}
    drop(stream);
    assert_eq!(session.transcript().len(), 2);

    let removed = session.reset_conversation();
    assert_eq!(removed, 2);
    assert!(session.transcript().is_empty());
    assert_eq!(session.cached_documents(), 1);
}

#[tokio::test]
async fn indexing_text_from_a_page_is_cached_by_name() {
    let provider = ScriptedProvider::answering(&["ok"]);
    let loader = CountingLoader::with_content("unused");
    let (mut session, _store) = new_session(provider.clone(), loader.clone()).await;

    let first = session
        .index_text("https://example.com/post", "Fetched article body.")
        .await
        .unwrap();
    assert!(!first.cached);
    assert_eq!(loader.loads(), 0);

    let second = session
        .index_text("https://example.com/post", "Fetched article body.")
        .await
        .unwrap();
    assert!(second.cached);
    assert!(Arc::ptr_eq(&first.pipeline, &second.pipeline));
    assert_eq!(provider.embeds(), 1);
}

#[test]
fn file_names_are_sanitized_for_staging() {
    assert_eq!(sanitize_file_name("report v2.txt"), "report_v2.txt");
    assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
    assert_eq!(sanitize_file_name("..."), "document.txt");
    assert_eq!(sanitize_file_name("page.html"), "page.html");
}

#[test]
fn document_identity_rejects_blank_names() {
    assert!(document_identity("  ").is_err());
    assert_eq!(document_identity(" doc.txt ").unwrap(), "doc.txt");
}
