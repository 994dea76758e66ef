use agora_core::{AgoraError, Result, ToolCategory, ToolOutput, ToolSchema};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::BuiltinTool;

/// Per-call, read-only context handed to a tool handler.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub agent_id: String,
    /// The conversation bound to the running cycle, if any.
    pub conversation_id: Option<String>,
    /// Subject and trigger facts: `trigger`, `subject_id`, `subject_kind`,
    /// `sender_id`, `post_id`.
    pub metadata: Map<String, Value>,
}

impl ToolContext {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// The executable half of a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
{
    async fn call(&self, input: Value, ctx: ToolContext) -> Result<ToolOutput> {
        (self)(input, ctx).await
    }
}

/// A registered capability.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub category: ToolCategory,
    pub description: String,
    /// JSON Schema of the input object.
    pub parameters: Value,
    /// Whether the heat limiter gates this tool.
    pub throttled: bool,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("throttled", &self.throttled)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        category: ToolCategory,
        description: impl Into<String>,
        parameters: Value,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            description: description.into(),
            parameters,
            throttled: false,
            handler: Arc::new(handler),
        }
    }

    /// A built-in tool; name, category and throttling come from the enum.
    pub fn builtin(
        tool: BuiltinTool,
        description: impl Into<String>,
        parameters: Value,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self::new(tool.name(), tool.category(), description, parameters, handler)
            .throttled(tool.is_throttled())
    }

    pub fn throttled(mut self, throttled: bool) -> Self {
        self.throttled = throttled;
        self
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    pub fn required_params(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Required parameters that are absent or null in `input`.
    pub fn missing_params(&self, input: &Value) -> Vec<String> {
        self.required_params()
            .into_iter()
            .filter(|p| input.get(*p).is_none_or(|v| v.is_null()))
            .map(String::from)
            .collect()
    }

    fn check_schema(&self) -> Result<()> {
        let invalid = |reason: &str| AgoraError::InvalidToolSchema {
            tool: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("empty name"));
        }
        if self.parameters.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(invalid("parameters must be an object schema"));
        }
        let properties = self
            .parameters
            .get("properties")
            .and_then(|p| p.as_object())
            .ok_or_else(|| invalid("missing properties"))?;
        if let Some(required) = self.parameters.get("required") {
            let required = required
                .as_array()
                .ok_or_else(|| invalid("required must be an array"))?;
            for param in required {
                let param = param
                    .as_str()
                    .ok_or_else(|| invalid("required entries must be strings"))?;
                if !properties.contains_key(param) {
                    return Err(invalid(&format!("required parameter {param} not in properties")));
                }
            }
        }
        Ok(())
    }
}

/// Name → definition lookup table. Filled once at startup, then shared
/// read-only behind an `Arc`.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name wins.
    pub fn register(&mut self, definition: ToolDefinition) {
        debug!(tool = %definition.name, category = %definition.category, "registering tool");
        if let Some(previous) = self.tools.insert(definition.name.clone(), definition) {
            warn!(tool = %previous.name, "tool registered twice, keeping the later definition");
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDefinition> {
        self.tools
            .get(name)
            .ok_or_else(|| AgoraError::ToolNotFound(name.to_string()))
    }

    /// Resolve and insist on a category.
    pub fn resolve_in(&self, name: &str, category: ToolCategory) -> Result<&ToolDefinition> {
        let def = self.resolve(name)?;
        if def.category != category {
            return Err(AgoraError::ToolCategoryMismatch {
                tool: name.to_string(),
                expected: category.to_string(),
                actual: def.category.to_string(),
            });
        }
        Ok(def)
    }

    pub fn resolve_builtin(&self, tool: BuiltinTool) -> Result<&ToolDefinition> {
        self.resolve_in(tool.name(), tool.category())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions in one category, sorted by name.
    pub fn by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .filter(|d| d.category == category)
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Startup check: every schema is well formed and every built-in that
    /// is registered carries the category its identity demands.
    pub fn validate(&self) -> Result<()> {
        for def in self.tools.values() {
            def.check_schema()?;
            if let Some(builtin) = BuiltinTool::parse(&def.name) {
                if builtin.category() != def.category {
                    return Err(AgoraError::InvalidToolSchema {
                        tool: def.name.clone(),
                        reason: format!(
                            "registered as {} but is a {} tool",
                            def.category,
                            builtin.category()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

// ── Argument helpers ───────────────────────────────────────────

pub(crate) fn str_arg<'a>(input: &'a Value, tool: BuiltinTool, key: &str) -> Result<&'a str> {
    match input.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(AgoraError::InvalidToolInput {
            tool: tool.name().into(),
            reason: format!("{key} must not be empty"),
        }),
        Some(Value::Null) | None => Err(AgoraError::MissingParameter {
            tool: tool.name().into(),
            param: key.into(),
        }),
        Some(_) => Err(AgoraError::InvalidToolInput {
            tool: tool.name().into(),
            reason: format!("{key} must be a string"),
        }),
    }
}

pub(crate) fn opt_str_arg<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
