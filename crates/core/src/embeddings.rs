use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1_024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service, e.g. `http://localhost:11434`.
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "bge-large".to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for an Ollama-compatible `POST /api/embeddings` endpoint.
pub struct HttpEmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn embeddings_url(&self) -> String {
        format!(
            "{}/api/embeddings",
            self.config.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(self.embeddings_url())
            .timeout(self.config.timeout)
            .json(&EmbeddingRequest {
                model: &self.config.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|error| EmbeddingError::Unreachable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Rejected {
                status: status.as_u16(),
            });
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::InvalidResponse(error.to_string()))?;

        if payload.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "embedding array is empty".to_string(),
            ));
        }

        // Tolerated so a model upgrade does not hard-fail ingestion.
        if payload.embedding.len() != self.config.dimensions {
            warn!(
                expected = self.config.dimensions,
                actual = payload.embedding.len(),
                model = %self.config.model,
                "embedding dimension drift"
            );
        }

        Ok(payload.embedding)
    }
}
