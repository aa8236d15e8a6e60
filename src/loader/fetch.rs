use std::time::Duration;

use reqwest::Client;
use tracing::info;

use super::html;
use crate::core::errors::ChatError;

/// Downloads a web page and reduces it to plain text for indexing.
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, ChatError> {
        info!("Fetching page content from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChatError::Load(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ChatError::Load(format!(
                "Failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Load(format!("Failed to read body of {}: {}", url, e)))?;

        let text = html::strip_tags(&body);
        if text.is_empty() {
            return Err(ChatError::Load(format!(
                "No extractable content at {}",
                url
            )));
        }

        Ok(text)
    }
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
