//! HTTP transport for Azure-OpenAI-style image generation operations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ImageJobError, ImageJobTransport, ImageOperation, OperationStatus, PollResponse};
use crate::config::BackendConfig;

const API_VERSION: &str = "2023-06-01-preview";

/// Transport speaking the submit/poll operation endpoints:
/// `POST {base}/openai/images/generations:submit` and
/// `GET {base}/openai/operations/images/{id}`.
#[derive(Debug)]
pub struct HttpImageJobTransport {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpImageJobTransport {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    id: String,
    status: OperationStatus,
    #[serde(default)]
    result: Option<OperationResult>,
}

#[derive(Debug, Deserialize)]
struct OperationResult {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

impl OperationResponse {
    fn into_operation(self) -> ImageOperation {
        let result_urls = self
            .result
            .map(|r| r.data.into_iter().filter_map(|d| d.url).collect())
            .unwrap_or_default();
        ImageOperation {
            id: self.id,
            status: self.status,
            result_urls,
        }
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl ImageJobTransport for HttpImageJobTransport {
    async fn submit(&self, prompt: &str) -> Result<ImageOperation, ImageJobError> {
        let body = SubmitRequest {
            prompt,
            n: 1,
            size: "1024x1024",
        };

        let response = self
            .client
            .post(format!(
                "{}/openai/images/generations:submit?api-version={}",
                self.config.base_url, API_VERSION
            ))
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ImageJobError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageJobError::Transport(format!(
                "submit returned HTTP {}: {}",
                status, message
            )));
        }

        let parsed: OperationResponse = response
            .json()
            .await
            .map_err(|e| ImageJobError::Transport(e.to_string()))?;

        Ok(parsed.into_operation())
    }

    async fn fetch(&self, id: &str) -> Result<PollResponse, ImageJobError> {
        let response = self
            .client
            .get(format!(
                "{}/openai/operations/images/{}?api-version={}",
                self.config.base_url, id, API_VERSION
            ))
            .header("api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| ImageJobError::Transport(e.to_string()))?;

        let retry_after = retry_after_header(&response);

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageJobError::Transport(format!(
                "poll returned HTTP {}: {}",
                status, message
            )));
        }

        let parsed: OperationResponse = response
            .json()
            .await
            .map_err(|e| ImageJobError::Transport(e.to_string()))?;

        Ok(PollResponse {
            operation: parsed.into_operation(),
            retry_after,
        })
    }
}
