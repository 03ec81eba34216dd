//! Generation backend abstraction.
//!
//! Two capabilities behind trait seams: chat-style text generation (with a
//! structured-output helper on top) and text embedding. Implementations are
//! stateless per call and thread-safe; retry policy belongs to callers.

mod embedding;
mod fake;
mod openai;

pub use embedding::OpenAiEmbeddingGenerator;
pub use fake::{FakeEmbeddingGenerator, FakeTextGenerator};
pub use openai::OpenAiTextGenerator;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error type for generation backend calls.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

/// A chat-style completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Ask the backend to constrain output to a JSON object.
    pub json_response: bool,
}

/// Trait for text generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    /// Send a prompt and return the raw model text.
    async fn complete(&self, request: ChatRequest) -> Result<String, GenerationError>;
}

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync + fmt::Debug {
    /// Map text to a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError>;
}

/// Generate a value of shape `T` by teaching the backend the expected JSON
/// shape through a serialized example.
///
/// The example is appended to the system message; the reply is deserialized
/// into `T`. A reply that does not match the shape is a
/// [`GenerationError::ParseError`]. No retries here.
pub async fn generate_structured<T>(
    generator: &dyn TextGenerator,
    example: &T,
    system_message: &str,
    prompt: &str,
) -> Result<T, GenerationError>
where
    T: Serialize + DeserializeOwned,
{
    let example_json = serde_json::to_string_pretty(example)
        .map_err(|e| GenerationError::ParseError(format!("Failed to serialize example: {}", e)))?;

    let system = format!(
        "{system_message}\n\nRespond with JSON only, no other text, matching exactly this shape:\n{example_json}"
    );

    let request = ChatRequest {
        system: Some(system),
        prompt: prompt.to_string(),
        json_response: true,
    };

    let content = generator.complete(request).await?;
    let body = strip_code_fences(&content);

    serde_json::from_str(body).map_err(|e| {
        GenerationError::ParseError(format!("Response did not match expected shape: {}", e))
    })
}

/// Strip a surrounding markdown code fence, if present. Models sometimes
/// wrap JSON in ```json fences even when asked not to.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
