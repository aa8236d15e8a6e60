use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppConfig, AppPaths};
use crate::index::{SqliteVectorStore, VectorStore};
use crate::llm::{LlmProvider, ModelCatalog, OllamaProvider};
use crate::loader::{DocumentLoader, PageFetcher, TextDocumentLoader};
use crate::session::ChatSession;

pub mod error;

use error::InitializationError;

/// Global application state shared across routes; each WebSocket
/// connection derives its own `ChatSession` from it.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub catalog: ModelCatalog,
    pub provider: Arc<dyn LlmProvider>,
    pub loader: Arc<dyn DocumentLoader>,
    pub store: Arc<dyn VectorStore>,
    pub fetcher: Arc<PageFetcher>,
}

impl AppState {
    /// Initializes the application state: paths and configuration, the
    /// vector store database, and the Ollama-backed provider.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config =
            AppConfig::load(&paths).map_err(|e| InitializationError::Config(e.into()))?;

        let catalog = ModelCatalog::from_settings(&config.models);

        let provider: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(
            &config.ollama.base_url,
            Duration::from_secs(config.ollama.request_timeout_secs),
        ));

        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::new(paths.as_ref())
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );

        let loader: Arc<dyn DocumentLoader> = Arc::new(TextDocumentLoader);
        let fetcher = Arc::new(PageFetcher::new(Duration::from_secs(
            config.indexing.fetch_timeout_secs,
        )));

        let provider_probe = Arc::clone(&provider);
        tokio::spawn(async move {
            match provider_probe.health_check().await {
                Ok(true) => tracing::info!("Ollama is reachable"),
                _ => tracing::warn!(
                    "Ollama is not reachable yet; indexing and chat will fail until it is"
                ),
            }
        });

        Ok(Arc::new(AppState {
            paths,
            config: Arc::new(config),
            catalog,
            provider,
            loader,
            store,
            fetcher,
        }))
    }

    /// Fresh session bound to this process's provider, loader and store.
    pub fn new_session(&self) -> ChatSession {
        ChatSession::new(
            self.catalog.clone(),
            self.config.models.embedding_model.clone(),
            &self.config.indexing,
            Arc::clone(&self.provider),
            Arc::clone(&self.loader),
            Arc::clone(&self.store),
        )
    }
}
