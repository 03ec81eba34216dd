//! Long-running image generation job client.
//!
//! Implements the submit-and-poll protocol: submit a prompt, receive an
//! operation id, poll until the operation reaches a terminal state. The
//! state machine is explicit — a status enum handled by match, never
//! exceptions-as-control-flow. Transport failures during polling are
//! retried with backoff; a terminal non-success status stops immediately
//! without consuming further retry budget.

mod fake;
mod http;

pub use fake::{FakeImageJobTransport, PollScript};
pub use http::HttpImageJobTransport;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;

/// Server-side status of an image generation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    NotRunning,
    Running,
    Succeeded,
    // Some backends spell this with one l.
    #[serde(alias = "canceled")]
    Cancelled,
    Failed,
    Deleted,
}

impl OperationStatus {
    /// Whether the operation will never change state again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationStatus::NotRunning | OperationStatus::Running)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationStatus::NotRunning => "notRunning",
            OperationStatus::Running => "running",
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Cancelled => "cancelled",
            OperationStatus::Failed => "failed",
            OperationStatus::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// Snapshot of a server-side operation.
#[derive(Debug, Clone)]
pub struct ImageOperation {
    pub id: String,
    pub status: OperationStatus,
    /// URLs of generated images, present once the operation succeeds.
    pub result_urls: Vec<String>,
}

/// One poll result: the operation snapshot plus an optional server-provided
/// wait hint.
#[derive(Debug, Clone)]
pub struct PollResponse {
    pub operation: ImageOperation,
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ImageJobError {
    /// Submission itself failed or returned no operation id. Never retried.
    #[error("Image job submission failed: {0}")]
    SubmitFailed(String),

    #[error("Image job transport error: {0}")]
    Transport(String),

    /// The operation reached a terminal state other than success.
    #[error("Image operation terminated with status {0}")]
    OperationTerminated(OperationStatus),

    /// The operation succeeded but the payload carried no result URL.
    #[error("Image operation succeeded but returned no result URL")]
    InvalidResult,

    #[error("Image operation did not reach a terminal state after {attempts} poll attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Image job cancelled")]
    Cancelled,
}

/// Transport behind the poll loop, so the state machine is testable with a
/// scripted fake.
#[async_trait]
pub trait ImageJobTransport: Send + Sync + fmt::Debug {
    /// Submit a generation prompt, returning the created operation.
    async fn submit(&self, prompt: &str) -> Result<ImageOperation, ImageJobError>;

    /// Fetch the current state of an operation.
    async fn fetch(&self, id: &str) -> Result<PollResponse, ImageJobError>;
}

/// Client driving the submit-and-poll protocol against a transport.
///
/// Stateless across calls; safe to share between workers.
#[derive(Debug)]
pub struct ImageJobClient {
    transport: std::sync::Arc<dyn ImageJobTransport>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ImageJobClient {
    pub fn new(
        transport: std::sync::Arc<dyn ImageJobTransport>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            retry,
            cancel,
        }
    }

    /// Generate one image and return its result URL.
    ///
    /// Every completed poll attempt counts toward `max_retries`, whether it
    /// failed at transport or returned a non-terminal status. A terminal
    /// status returns immediately and never waits.
    pub async fn generate(&self, prompt: &str) -> Result<String, ImageJobError> {
        if self.cancel.is_cancelled() {
            return Err(ImageJobError::Cancelled);
        }

        let operation = self.transport.submit(prompt).await.map_err(|e| match e {
            ImageJobError::Transport(message) | ImageJobError::SubmitFailed(message) => {
                ImageJobError::SubmitFailed(message)
            }
            other => other,
        })?;

        if operation.id.is_empty() {
            return Err(ImageJobError::SubmitFailed(
                "submission returned no operation id".to_string(),
            ));
        }

        // Some backends complete synchronously on submit.
        if operation.status.is_terminal() {
            return Self::finish(operation);
        }

        for attempt in 0..self.retry.max_retries {
            if self.cancel.is_cancelled() {
                return Err(ImageJobError::Cancelled);
            }

            match self.transport.fetch(&operation.id).await {
                Err(e) => {
                    tracing::debug!(
                        id = %operation.id,
                        attempt,
                        error = %e,
                        "Image operation poll failed, will retry"
                    );
                    self.wait(attempt, None).await?;
                }
                Ok(poll) => match poll.operation.status {
                    OperationStatus::Succeeded
                    | OperationStatus::Cancelled
                    | OperationStatus::Failed
                    | OperationStatus::Deleted => return Self::finish(poll.operation),
                    OperationStatus::NotRunning | OperationStatus::Running => {
                        tracing::debug!(
                            id = %operation.id,
                            attempt,
                            status = %poll.operation.status,
                            "Image operation still pending"
                        );
                        self.wait(attempt, poll.retry_after).await?;
                    }
                },
            }
        }

        Err(ImageJobError::RetriesExhausted {
            attempts: self.retry.max_retries,
        })
    }

    fn finish(operation: ImageOperation) -> Result<String, ImageJobError> {
        match operation.status {
            OperationStatus::Succeeded => operation
                .result_urls
                .into_iter()
                .next()
                .ok_or(ImageJobError::InvalidResult),
            status => Err(ImageJobError::OperationTerminated(status)),
        }
    }

    /// Wait before the next poll: the server hint if present, else
    /// exponential backoff `base_delay * 2^attempt`. Aborts immediately on
    /// cancellation.
    async fn wait(&self, attempt: u32, retry_after: Option<Duration>) -> Result<(), ImageJobError> {
        let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ImageJobError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry.base_delay * 2u32.saturating_pow(attempt)
    }
}
