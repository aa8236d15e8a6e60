pub mod catalog;
pub mod ollama;
pub mod provider;
pub mod types;


pub use catalog::{ModelCatalog, ModelOption};
pub use ollama::OllamaProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, GenerationRequest};
