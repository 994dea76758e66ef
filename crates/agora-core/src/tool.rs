use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a tool only reads the world or may change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Read-only; used by the Observe step.
    Data,
    /// Side-effecting; used by the Act step.
    Action,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Data => "data",
            ToolCategory::Action => "action",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable description of a tool, as handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique name, e.g. "like", "send_message", "get_feed".
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// A request from the LLM to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// What a tool handler returns on success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Structured result, fed back into the observation.
    pub content: Value,
    /// Whether the call changed shared world state (drives the Loop decision).
    #[serde(default)]
    pub changed_world: bool,
    /// The entity the action touched, recorded alongside heat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Agent ids mentioned by content this action published.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

impl ToolOutput {
    /// A read-only result.
    pub fn data(content: Value) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    /// A result from an action that changed the world.
    pub fn changed(content: Value, target_id: impl Into<String>) -> Self {
        Self {
            content,
            changed_world: true,
            target_id: Some(target_id.into()),
            mentions: vec![],
        }
    }

    pub fn with_mentions(mut self, mentions: Vec<String>) -> Self {
        self.mentions = mentions;
        self
    }
}
