//! Backend trait and mock implementation.
//!
//! [`ModelBackend`] is the seam between the agent loop and a concrete
//! provider. The real implementation is [`crate::gemini::GeminiBackend`];
//! [`MockBackend`] returns scripted responses for deterministic tests of the
//! turn loop.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse};

/// Trait for reasoning-engine providers.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    ///
    /// Implementations own their retry behavior: a returned error is
    /// terminal and must not be retried further up the stack.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Name of this backend, for logging.
    fn name(&self) -> &str;
}

/// A backend that can be shared across components.
pub type SharedBackend = Arc<dyn ModelBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted result for [`MockBackend`].
#[derive(Debug)]
pub enum MockResult {
    Success(CompletionResponse),
    Error(LlmError),
}

/// A mock backend for testing.
///
/// Returns pre-configured results in order and records every request so
/// tests can assert on what the loop sent.
#[derive(Debug)]
pub struct MockBackend {
    results: std::sync::Mutex<Vec<MockResult>>,
    request_log: std::sync::Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Create a mock backend from scripted results.
    pub fn with_results(results: Vec<MockResult>) -> Self {
        Self {
            results: std::sync::Mutex::new(results),
            request_log: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend from scripted responses.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::with_results(responses.into_iter().map(MockResult::Success).collect())
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse::text_only(text)])
    }

    /// All requests made to this backend so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().unwrap().push(request);

        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            return Err(LlmError::InvalidResponse(
                "MockBackend: no more responses available".to_string(),
            ));
        }
        match results.remove(0) {
            MockResult::Success(response) => Ok(response),
            MockResult::Error(err) => Err(err),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn mock_returns_responses_in_order() {
        let backend = MockBackend::new(vec![
            CompletionResponse::text_only("first"),
            CompletionResponse::text_only("second"),
        ]);

        let r1 = backend
            .complete(CompletionRequest::new(vec![Message::user("1")]))
            .await
            .unwrap();
        let r2 = backend
            .complete(CompletionRequest::new(vec![Message::user("2")]))
            .await
            .unwrap();

        assert_eq!(r1.text(), "first");
        assert_eq!(r2.text(), "second");
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn mock_surfaces_scripted_errors() {
        let backend = MockBackend::with_results(vec![MockResult::Error(LlmError::http(
            503,
            "unavailable",
        ))]);

        let err = backend
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn mock_exhaustion_is_an_error() {
        let backend = MockBackend::new(vec![]);
        let result = backend
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await;
        assert!(result.is_err());
    }
}
