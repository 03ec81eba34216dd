//! OpenAI-compatible chat completion adapter.

use super::{ChatRequest, GenerationError, TextGenerator};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text generator backed by an OpenAI-compatible `/chat/completions`
/// endpoint.
#[derive(Debug)]
pub struct OpenAiTextGenerator {
    config: BackendConfig,
    client: reqwest::Client,
}

impl OpenAiTextGenerator {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn complete(&self, request: ChatRequest) -> Result<String, GenerationError> {
        let mut messages = Vec::new();
        if let Some(system) = request.system {
            messages.push(Message {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.prompt,
        });

        let body = CompletionRequest {
            model: self.config.model.clone(),
            messages,
            response_format: request.json_response.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        tracing::debug!(model = %self.config.model, "Calling chat completion API");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        if status != 200 {
            if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&text) {
                return Err(GenerationError::ApiError {
                    status,
                    message: parsed.error.message,
                });
            }
            return Err(GenerationError::ApiError {
                status,
                message: text,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::ParseError("No content in response".to_string()))
    }
}
