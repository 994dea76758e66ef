use agora_core::{AgoraError, Message, Result, Role, ToolCall};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::provider::*;

/// OpenAI-compatible chat completions provider (OpenAI, OpenRouter, vLLM, ...).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            provider_name: "openai".into(),
        }
    }

    /// Use a custom base URL for another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Client-side request timeout. The engine applies its own timeout too.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(client) = reqwest::Client::builder().timeout(timeout).build() {
            self.client = client;
        }
        self
    }

    fn build_body(request: &LlmRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for msg in &request.messages {
            messages.push(message_to_json(msg));
        }

        let mut body = json!({
            "model": &request.model,
            "temperature": request.temperature,
            "messages": messages,
        });

        // Newer OpenAI models (o1, o3, gpt-5, …) require max_completion_tokens
        if uses_max_completion_tokens(&request.model) {
            body["max_completion_tokens"] = json!(request.max_tokens);
        } else {
            body["max_tokens"] = json!(request.max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }
        body
    }
}

fn message_to_json(msg: &Message) -> Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    if msg.tool_calls.is_empty() {
        return json!({ "role": role, "content": msg.content });
    }
    let calls: Vec<Value> = msg
        .tool_calls
        .iter()
        .map(|tc| {
            json!({
                "id": tc.id,
                "type": "function",
                "function": {
                    "name": tc.tool_name,
                    "arguments": tc.arguments.to_string(),
                }
            })
        })
        .collect();
    let content = if msg.content.is_empty() {
        Value::Null
    } else {
        json!(msg.content)
    };
    json!({ "role": role, "content": content, "tool_calls": calls })
}

/// Turn a chat completions payload into an `LlmResponse`.
///
/// Missing choices or tool-call arguments that are not valid JSON are
/// reported as `MalformedResponse` so the caller can retry.
pub fn parse_response(data: &Value) -> Result<LlmResponse> {
    let choice = data["choices"]
        .get(0)
        .ok_or_else(|| AgoraError::MalformedResponse("response has no choices".into()))?;

    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = choice["message"]["tool_calls"].as_array() {
        for (i, c) in calls.iter().enumerate() {
            let name = c["function"]["name"].as_str().ok_or_else(|| {
                AgoraError::MalformedResponse("tool call without a function name".into())
            })?;
            let raw_args = c["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments: Value = serde_json::from_str(raw_args).map_err(|e| {
                AgoraError::MalformedResponse(format!("arguments for {name} are not JSON: {e}"))
            })?;
            tool_calls.push(ToolCall {
                id: c["id"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| format!("call_{i}")),
                tool_name: name.to_string(),
                arguments,
            });
        }
    }

    let has_tool_calls = !tool_calls.is_empty();
    let usage = &data["usage"];
    Ok(LlmResponse {
        content,
        tool_calls,
        usage: Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        },
        stop_reason: match choice["finish_reason"].as_str().unwrap_or("") {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ if has_tool_calls => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        },
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn models(&self) -> Vec<String> {
        vec![
            "gpt-4o".into(),
            "gpt-4o-mini".into(),
            "o3-mini".into(),
            "gpt-5-mini".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = Self::build_body(request);
        debug!(model = %request.model, tools = request.tools.len(), "openai request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgoraError::LlmProvider(format!("request timed out: {e}"))
                } else {
                    AgoraError::LlmProvider(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AgoraError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AgoraError::MalformedResponse(e.to_string()))?;

        parse_response(&data)
    }

    async fn health_check(&self) -> Result<()> {
        info!(provider = self.provider_name, "checking API health");
        if self.api_key.is_empty() {
            return Err(AgoraError::LlmProvider(format!(
                "{} API key not set",
                self.provider_name
            )));
        }
        Ok(())
    }
}

/// Returns true for models that require `max_completion_tokens` instead of `max_tokens`.
fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
        || m.contains("gpt-5")
        || m.contains("gpt5")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_uses_completion_tokens_for_reasoning_models() {
        let mut req = LlmRequest::new("o3-mini");
        req.max_tokens = 77;
        let body = OpenAiProvider::build_body(&req);
        assert_eq!(body["max_completion_tokens"], 77);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_body_includes_system_and_tools() {
        let mut req = LlmRequest::new("gpt-4o-mini");
        req.system = Some("you are a cat".into());
        req.tools = vec![agora_core::ToolSchema {
            name: "like".into(),
            description: "Like a post".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let body = OpenAiProvider::build_body(&req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["function"]["name"], "like");
    }
}
