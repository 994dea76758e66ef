use thiserror::Error;

/// Unified error type for the entire Agora engine.
#[derive(Error, Debug)]
pub enum AgoraError {
    // ── Engine errors ──────────────────────────────────────────
    #[error("engine error: {0}")]
    Engine(String),

    #[error("handler panicked: {tool}: {reason}")]
    HandlerPanic { tool: String, reason: String },

    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm call timed out after {secs}s")]
    LlmTimeout { secs: u64 },

    #[error("malformed llm response: {0}")]
    MalformedResponse(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool {tool} is a {actual} tool, expected {expected}")]
    ToolCategoryMismatch {
        tool: String,
        expected: String,
        actual: String,
    },

    #[error("missing required parameter: {tool}: {param}")]
    MissingParameter { tool: String, param: String },

    #[error("invalid tool input: {tool}: {reason}")]
    InvalidToolInput { tool: String, reason: String },

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("tool timed out: {0}")]
    ToolTimeout(String),

    #[error("invalid tool schema: {tool}: {reason}")]
    InvalidToolSchema { tool: String, reason: String },

    // ── World errors ───────────────────────────────────────────
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    // ── Throttling / budget ────────────────────────────────────
    #[error("heat limit reached: current {current_heat}, cooldown {cooldown_minutes}m")]
    HeatBlocked {
        current_heat: u32,
        cooldown_minutes: u32,
    },

    #[error("budget exceeded: {resource}: used {used}, limit {limit}")]
    BudgetExceeded {
        resource: String,
        used: u64,
        limit: u64,
    },

    // ── Scheduler / triggers ───────────────────────────────────
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AgoraError {
    /// Shorthand for a missing world entity.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Whether a retry of the same model call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LlmProvider(_) | Self::LlmTimeout { .. } | Self::MalformedResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AgoraError>;
