use agora_core::{Message, Result, ToolCall, ToolSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier. The router strips the `provider/` prefix before
    /// handing the request to a concrete provider.
    pub model: String,
    /// System prompt (actor identity, escalation guidance).
    pub system: Option<String>,
    /// Conversation so far: the observation and any earlier turns.
    pub messages: Vec<Message>,
    /// Tools the model may call in this turn.
    pub tools: Vec<ToolSchema>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages: vec![],
            tools: vec![],
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// A complete response from an LLM.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Free text returned alongside (or instead of) tool calls.
    pub content: String,
    /// Tool calls in the order the model returned them.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait implemented by each LLM provider.
///
/// Implementations must be safe to retry: the engine may call `complete`
/// again after a timeout even if the first request later finishes upstream.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, also used as the routing prefix ("openai", "mock").
    fn name(&self) -> &str;

    /// List available models.
    fn models(&self) -> Vec<String>;

    /// Send a request and wait for the full response.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is usable (key present, endpoint reachable).
    async fn health_check(&self) -> Result<()>;
}
