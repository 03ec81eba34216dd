//! Scripted fake transport for testing the poll loop and pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ImageJobError, ImageJobTransport, ImageOperation, OperationStatus, PollResponse};

#[derive(Debug, Clone)]
enum PollOutcome {
    Pending(OperationStatus, Option<Duration>),
    Succeeded(Option<String>),
    Terminal(OperationStatus),
    Error(String),
}

/// Ordered script of poll outcomes. The final entry repeats if the client
/// keeps polling past the end of the script.
#[derive(Debug, Clone, Default)]
pub struct PollScript {
    outcomes: Vec<PollOutcome>,
    submit_error: Option<String>,
}

impl PollScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(mut self, status: OperationStatus) -> Self {
        self.outcomes.push(PollOutcome::Pending(status, None));
        self
    }

    pub fn pending_with_hint(mut self, status: OperationStatus, retry_after: Duration) -> Self {
        self.outcomes
            .push(PollOutcome::Pending(status, Some(retry_after)));
        self
    }

    pub fn succeed(mut self, url: &str) -> Self {
        self.outcomes
            .push(PollOutcome::Succeeded(Some(url.to_string())));
        self
    }

    pub fn succeed_without_url(mut self) -> Self {
        self.outcomes.push(PollOutcome::Succeeded(None));
        self
    }

    pub fn terminal(mut self, status: OperationStatus) -> Self {
        self.outcomes.push(PollOutcome::Terminal(status));
        self
    }

    /// Every poll fails at transport.
    pub fn always_error(mut self, message: &str) -> Self {
        self.outcomes.push(PollOutcome::Error(message.to_string()));
        self
    }

    /// Submission itself fails.
    pub fn fail_submit(mut self, message: &str) -> Self {
        self.submit_error = Some(message.to_string());
        self
    }
}

/// Fake [`ImageJobTransport`] driven by a [`PollScript`].
#[derive(Debug)]
pub struct FakeImageJobTransport {
    script: Mutex<Vec<PollOutcome>>,
    submit_error: Option<String>,
    submits: AtomicUsize,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeImageJobTransport {
    pub fn new(script: PollScript) -> Self {
        let mut outcomes = script.outcomes;
        // Pop from the back.
        outcomes.reverse();
        Self {
            script: Mutex::new(outcomes),
            submit_error: script.submit_error,
            submits: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep inside each call, making concurrency observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Peak number of concurrent in-flight calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Option<PollOutcome> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop()
        } else {
            script.last().cloned()
        }
    }

    async fn track<R>(&self, work: impl std::future::Future<Output = R>) -> R {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = work.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl ImageJobTransport for FakeImageJobTransport {
    async fn submit(&self, _prompt: &str) -> Result<ImageOperation, ImageJobError> {
        self.track(async {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.submit_error {
                return Err(ImageJobError::Transport(message.clone()));
            }
            Ok(ImageOperation {
                id: "fake-op-1".to_string(),
                status: OperationStatus::NotRunning,
                result_urls: Vec::new(),
            })
        })
        .await
    }

    async fn fetch(&self, id: &str) -> Result<PollResponse, ImageJobError> {
        self.track(async {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .next_outcome()
                .ok_or_else(|| ImageJobError::Transport("script exhausted".to_string()))?;

            let (status, result_urls, retry_after) = match outcome {
                PollOutcome::Pending(status, retry_after) => (status, Vec::new(), retry_after),
                PollOutcome::Succeeded(url) => (
                    OperationStatus::Succeeded,
                    url.into_iter().collect(),
                    None,
                ),
                PollOutcome::Terminal(status) => (status, Vec::new(), None),
                PollOutcome::Error(message) => return Err(ImageJobError::Transport(message)),
            };

            Ok(PollResponse {
                operation: ImageOperation {
                    id: id.to_string(),
                    status,
                    result_urls,
                },
                retry_after,
            })
        })
        .await
    }
}
