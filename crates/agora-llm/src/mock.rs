//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::*;
use agora_core::{AgoraError, Result, ToolCall};

/// A mock LLM provider that returns queued responses in order.
///
/// # Example
/// ```
/// use agora_llm::mock::MockProvider;
/// let provider = MockProvider::new("mock")
///     .with_tool_call("like", serde_json::json!({"post_id": "p1"}))
///     .with_response("done");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Returned once the queue is drained. Defaults to a plain text reply.
    fallback: Mutex<Option<MockResponse>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Clone)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
    /// Sleep before answering (for timeout tests).
    pub delay: Option<Duration>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            error: None,
            delay: None,
        }
    }
}

impl MockResponse {
    /// Create a text response.
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Create a response requesting several tool calls, in order.
    pub fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        Self {
            tool_calls: calls
                .into_iter()
                .map(|(name, args)| ToolCall::new(name, args))
                .collect(),
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }

    /// Create an error response.
    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Mutex::new(None),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push_back(MockResponse::text(text));
        self
    }

    /// Queue a single tool call response.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.responses
            .lock()
            .push_back(MockResponse::tool_calls(vec![(name, args)]));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push_back(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push_back(resp);
        self
    }

    /// Response to repeat forever once the queue is empty.
    pub fn with_fallback(self, resp: MockResponse) -> Self {
        *self.fallback.lock() = Some(resp);
        self
    }

    /// Queue a response through a shared reference.
    pub fn queue_response(&self, resp: MockResponse) {
        self.responses.lock().push_back(resp);
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Pop the next queued response, or the fallback.
    fn next_response(&self) -> MockResponse {
        if let Some(resp) = self.responses.lock().pop_front() {
            return resp;
        }
        self.fallback
            .lock()
            .clone()
            .unwrap_or_else(|| MockResponse::text("(mock: no more queued responses)"))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["mock/test-model".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(delay) = mock.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = mock.error {
            return Err(AgoraError::LlmProvider(error));
        }

        // Fresh ids per call so a repeated fallback still looks like new calls.
        let tool_calls = mock
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall::new(tc.tool_name, tc.arguments))
            .collect();

        Ok(LlmResponse {
            content: mock.text,
            tool_calls,
            usage: mock.usage,
            stop_reason: mock.stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_text_response() {
        let provider = MockProvider::new("mock").with_response("Hello!");
        let resp = provider.complete(&LlmRequest::new("test")).await.unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert!(!resp.has_tool_calls());
    }

    #[tokio::test]
    async fn test_mock_tool_call() {
        let provider = MockProvider::new("mock")
            .with_tool_call("like", serde_json::json!({"post_id": "p1"}));
        let resp = provider.complete(&LlmRequest::new("test")).await.unwrap();
        assert!(resp.has_tool_calls());
        assert_eq!(resp.tool_calls[0].tool_name, "like");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let provider = MockProvider::new("mock").with_error("HTTP 429: rate limited");
        let result = provider.complete(&LlmRequest::new("test")).await;
        assert!(matches!(result, Err(AgoraError::LlmProvider(_))));
    }

    #[tokio::test]
    async fn test_mock_fallback_repeats() {
        let provider = MockProvider::new("mock")
            .with_fallback(MockResponse::tool_calls(vec![("like", serde_json::json!({}))]));
        let a = provider.complete(&LlmRequest::new("test")).await.unwrap();
        let b = provider.complete(&LlmRequest::new("test")).await.unwrap();
        assert_eq!(a.tool_calls[0].tool_name, "like");
        assert_ne!(a.tool_calls[0].id, b.tool_calls[0].id);
        assert_eq!(provider.call_count(), 2);
    }
}
