//! Fake generation backends for testing.
//!
//! Deterministic, network-free implementations. Responses are matched by
//! prompt substring, with an optional default. Both fakes track call counts
//! and the peak number of concurrent in-flight calls so tests can assert
//! concurrency bounds.

use super::{ChatRequest, EmbeddingGenerator, GenerationError, TextGenerator};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Shared in-flight/peak tracking for the fakes.
#[derive(Debug, Default)]
struct FlightTracker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl FlightTracker {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fake text generator for testing.
#[derive(Debug, Default)]
pub struct FakeTextGenerator {
    /// (prompt substring, response) pairs checked in insertion order.
    responses: Mutex<Vec<(String, String)>>,
    default_response: Option<String>,
    /// Error message to fail every call with, overriding responses.
    failure: Option<String>,
    /// Artificial latency per call, to make concurrency observable.
    delay: Option<Duration>,
    requests: Mutex<Vec<ChatRequest>>,
    tracker: FlightTracker,
}

impl FakeTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `response` to prompts containing `prompt_contains`.
    pub fn with_response(self, prompt_contains: &str, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push((prompt_contains.to_string(), response.to_string()));
        self
    }

    /// Respond with `response` when no pattern matches.
    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_response = Some(response.to_string());
        self
    }

    /// Fail every call with a request error.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Sleep for `delay` inside each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.tracker.calls.load(Ordering::SeqCst)
    }

    /// Peak number of concurrent in-flight calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.tracker.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn complete(&self, request: ChatRequest) -> Result<String, GenerationError> {
        self.tracker.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().unwrap().push(request.clone());
        self.tracker.exit();

        if let Some(message) = &self.failure {
            return Err(GenerationError::RequestFailed(message.clone()));
        }

        let prompt_lower = request.prompt.to_lowercase();
        let responses = self.responses.lock().unwrap();
        for (pattern, response) in responses.iter() {
            if prompt_lower.contains(&pattern.to_lowercase()) {
                return Ok(response.clone());
            }
        }

        match &self.default_response {
            Some(response) => Ok(response.clone()),
            None => Err(GenerationError::RequestFailed(format!(
                "FakeTextGenerator: no response configured for prompt: {}",
                truncate_chars(&request.prompt, 100)
            ))),
        }
    }
}

/// Truncate to at most `max_chars` characters, never splitting a UTF-8
/// sequence.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// A fake embedding generator returning a fixed-length vector derived from
/// the input length.
#[derive(Debug)]
pub struct FakeEmbeddingGenerator {
    dimension: usize,
    failure: Option<String>,
    delay: Option<Duration>,
    tracker: FlightTracker,
}

impl Default for FakeEmbeddingGenerator {
    fn default() -> Self {
        Self {
            dimension: 8,
            failure: None,
            delay: None,
            tracker: FlightTracker::default(),
        }
    }
}

impl FakeEmbeddingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.tracker.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.tracker.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingGenerator for FakeEmbeddingGenerator {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        self.tracker.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.tracker.exit();

        if let Some(message) = &self.failure {
            return Err(GenerationError::RequestFailed(message.clone()));
        }

        // Deterministic but input-sensitive, so tests can tell vectors apart.
        let seed = text.len() as f32;
        Ok((0..self.dimension).map(|i| seed + i as f32).collect())
    }
}
