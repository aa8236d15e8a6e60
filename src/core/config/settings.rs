use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;
use crate::core::errors::ChatError;

/// Typed application configuration, loaded from `config.yml`.
///
/// A missing file yields the built-in defaults; a malformed file is a
/// configuration error rather than a silent fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub ollama: OllamaSettings,
    pub models: ModelSettings,
    pub indexing: IndexingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// The fixed model catalog offered to the user, plus the embedding model
/// used for every index regardless of the selected chat model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub catalog: Vec<CatalogEntry>,
    pub default: String,
    pub embedding_model: String,
}

/// One selectable model: the label shown to the user and the name the
/// serving backend knows it by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub label: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunks: usize,
    pub top_k: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            cors_allowed_origins: default_local_origins(),
        }
    }
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            catalog: vec![
                CatalogEntry {
                    label: "Phi-3".to_string(),
                    model: "phi3".to_string(),
                },
                CatalogEntry {
                    label: "Llama-3".to_string(),
                    model: "llama3".to_string(),
                },
            ],
            default: "Phi-3".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            max_chunks: 200,
            top_k: 1,
            fetch_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn load(paths: &AppPaths) -> Result<Self, ChatError> {
        Self::load_from(&config_path(paths))
    }

    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
            .map_err(|e| ChatError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }
}

pub fn config_path(paths: &AppPaths) -> PathBuf {
    if let Ok(path) = env::var("DOCCHAT_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    let user_config = paths.user_data_dir.join("config.yml");
    if user_config.exists() {
        return user_config;
    }

    paths.project_root.join("config.yml")
}

pub fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_builtin_catalog() {
        let config = AppConfig::default();

        assert_eq!(config.models.catalog.len(), 2);
        assert_eq!(config.models.catalog[0].label, "Phi-3");
        assert_eq!(config.models.catalog[0].model, "phi3");
        assert_eq!(config.models.default, "Phi-3");
        assert_eq!(config.models.embedding_model, "nomic-embed-text");
        assert_eq!(config.ollama.request_timeout_secs, 120);
        assert_eq!(config.indexing.top_k, 1);
        assert_eq!(config.indexing.chunk_size, 500);
        assert_eq!(config.indexing.chunk_overlap, 50);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = r#"
indexing:
  chunk_size: 800
  top_k: 3
ollama:
  base_url: "http://192.168.1.10:11434"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.indexing.chunk_size, 800);
        assert_eq!(config.indexing.top_k, 3);
        assert_eq!(config.indexing.chunk_overlap, 50);
        assert_eq!(config.ollama.base_url, "http://192.168.1.10:11434");
        assert_eq!(config.models.default, "Phi-3");
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        assert!(AppConfig::from_yaml("indexing: [not, a, map]").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("docchat-missing-{}.yml", uuid::Uuid::new_v4()));
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.models.default, "Phi-3");
    }
}
