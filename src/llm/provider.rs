use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::GenerationRequest;
use crate::core::errors::ChatError;

/// Seam over the model-serving backend: one server provides both the
/// embedding capability and streamed generation.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "ollama")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, ChatError>;

    /// generate embeddings, one vector per input, in input order
    async fn embed(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>, ChatError>;

    /// chat completion, streamed as text fragments in arrival order
    async fn stream_chat(
        &self,
        request: GenerationRequest,
        model: &str,
    ) -> Result<mpsc::Receiver<Result<String, ChatError>>, ChatError>;
}
