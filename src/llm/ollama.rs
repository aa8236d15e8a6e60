use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::GenerationRequest;
use crate::core::errors::ChatError;

/// Provider backed by a local Ollama server, speaking its native API:
/// `/api/tags` for health, `/api/embed` for embeddings and `/api/chat`
/// with NDJSON streaming for generation.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, ChatError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        match res {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn embed(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>, ChatError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Index(format!("Embedding request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ChatError::Index(format!(
                "Embedding backend error {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ChatError::Index(format!("Invalid embedding response: {}", e)))?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["embeddings"].as_array() {
            for item in data {
                if let Some(vals) = item.as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ChatError::Index(format!(
                "Embedding backend returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }

    async fn stream_chat(
        &self,
        request: GenerationRequest,
        model: &str,
    ) -> Result<mpsc::Receiver<Result<String, ChatError>>, ChatError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut body = json!({
            "model": model,
            "messages": request.messages,
            "stream": true,
        });

        if let Some(obj) = body.as_object_mut() {
            let mut options = Map::new();
            if let Some(t) = request.temperature {
                options.insert("temperature".to_string(), json!(t));
            }
            if let Some(n) = request.max_tokens {
                options.insert("num_predict".to_string(), json!(n));
            }
            if let Some(s) = request.stop {
                options.insert("stop".to_string(), json!(s));
            }
            if !options.is_empty() {
                obj.insert("options".to_string(), Value::Object(options));
            }
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Model(format!("Generation request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ChatError::Model(format!(
                "Generation backend error {}: {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // NDJSON lines can split across network chunks; carry the tail.
            let mut buf = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buf.find('\n') {
                            let line: String = buf.drain(..=pos).collect();
                            if forward_stream_line(line.trim(), &tx).await.is_break() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChatError::Model(format!("Ollama stream failed: {}", e))))
                            .await;
                        return;
                    }
                }
            }
            let _ = forward_stream_line(buf.trim(), &tx).await;
        });

        Ok(rx)
    }
}

/// Parse one NDJSON line and forward its content. Returns `Break` when
/// the stream is finished (done marker, backend error, or closed
/// receiver).
async fn forward_stream_line(
    line: &str,
    tx: &mpsc::Sender<Result<String, ChatError>>,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    if line.is_empty() {
        return ControlFlow::Continue(());
    }

    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return ControlFlow::Continue(());
    };

    if let Some(err) = value.get("error").and_then(|v| v.as_str()) {
        let _ = tx
            .send(Err(ChatError::Model(format!("Ollama error: {}", err))))
            .await;
        return ControlFlow::Break(());
    }

    if let Some(content) = value["message"]["content"].as_str() {
        if !content.is_empty() && tx.send(Ok(content.to_string())).await.is_err() {
            return ControlFlow::Break(());
        }
    }

    if value.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
        return ControlFlow::Break(());
    }

    ControlFlow::Continue(())
}
