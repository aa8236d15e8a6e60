use crate::core::config::settings::ModelSettings;
use crate::core::errors::ChatError;

/// One selectable chat model: the user-facing label and the name the
/// serving backend resolves it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOption {
    pub label: String,
    pub model: String,
}

/// The fixed, enumerated set of chat models a session can switch between.
///
/// Never empty: an empty catalog in the config falls back to the
/// built-in entries.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    options: Vec<ModelOption>,
    default_label: String,
}

impl ModelCatalog {
    pub fn from_settings(settings: &ModelSettings) -> Self {
        let entries = if settings.catalog.is_empty() {
            ModelSettings::default().catalog
        } else {
            settings.catalog.clone()
        };

        let options = entries
            .into_iter()
            .map(|entry| ModelOption {
                label: entry.label,
                model: entry.model,
            })
            .collect();

        Self {
            options,
            default_label: settings.default.clone(),
        }
    }

    pub fn options(&self) -> &[ModelOption] {
        &self.options
    }

    /// Look up a catalog entry by its label. Unknown labels are a
    /// configuration error for callers that require one.
    pub fn resolve(&self, label: &str) -> Result<&ModelOption, ChatError> {
        self.options
            .iter()
            .find(|option| option.label == label)
            .ok_or_else(|| ChatError::Config(format!("Unknown model: {}", label)))
    }

    pub fn default_option(&self) -> &ModelOption {
        self.options
            .iter()
            .find(|option| option.label == self.default_label)
            .unwrap_or(&self.options[0])
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::from_settings(&ModelSettings::default())
    }
}
