//! OpenAI-compatible embedding adapter.

use super::{EmbeddingGenerator, GenerationError};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Embedding generator backed by an OpenAI-compatible `/embeddings`
/// endpoint.
#[derive(Debug)]
pub struct OpenAiEmbeddingGenerator {
    config: BackendConfig,
    client: reqwest::Client,
}

impl OpenAiEmbeddingGenerator {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingGenerator for OpenAiEmbeddingGenerator {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        let body = EmbeddingRequest {
            model: self.config.model.clone(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::ApiError { status, message });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GenerationError::ParseError("No embedding in response".to_string()))
    }
}
