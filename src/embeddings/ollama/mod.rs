
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::OllamaConfig;
use crate::embeddings::EmbeddingProvider;
use crate::{PagechatError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Embedding provider backed by Ollama's `/api/embed` batch endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    url: Url,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    /// # Errors
    /// `EmbeddingUnavailable` when the endpoint URL is invalid or the
    /// HTTP client cannot be built.
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let url = config
            .base_url()?
            .join("/api/embed")
            .map_err(|e| PagechatError::EmbeddingUnavailable(format!("invalid embed URL: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| {
                PagechatError::EmbeddingUnavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            url,
            model: config.embedding_model.clone(),
            batch_size: config.batch_size.max(1) as usize,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| PagechatError::EmbeddingUnavailable(format!("transport error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(240).collect();
            return Err(PagechatError::EmbeddingUnavailable(format!(
                "HTTP {status}: {snippet}"
            )));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            PagechatError::EmbeddingUnavailable(format!("failed to parse embed response: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(PagechatError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            results.extend(self.embed_batch(batch).await?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}
