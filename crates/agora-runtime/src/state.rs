use agora_core::{Scope, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The node a cycle is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Observe,
    Reason,
    Act,
    Loop,
    Done,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Observe => "observe",
            Step::Reason => "reason",
            Step::Act => "act",
            Step::Loop => "loop",
            Step::Done => "done",
        }
    }
}

/// What the model decided in the last Reason step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reasoning {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopState {
    /// Starts at 1.
    pub iteration: u32,
    pub max_iterations: u32,
    /// Whether any action in the current iteration changed the world.
    pub changed_world: bool,
}

/// How one requested tool call ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Executed { changed_world: bool },
    /// Throttled. Not an error.
    HeatBlocked {
        current_heat: u32,
        cooldown_minutes: u32,
    },
    /// Unknown tool, wrong category or missing parameters. Never ran.
    Invalid { reason: String },
    /// Ran and failed, timed out or panicked.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub iteration: u32,
    pub tool: String,
    pub outcome: ActionOutcome,
}

/// Mutable record threaded through one invocation. Owned by that
/// invocation alone; the engine hands it back when the cycle ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub scope: Scope,
    pub step: Step,
    /// World facts gathered by Observe, keyed by data tool name.
    pub observation: Map<String, Value>,
    pub reasoning: Option<Reasoning>,
    /// Tool names that executed successfully, in order.
    pub executed_actions: Vec<String>,
    /// Non-fatal errors, in the order they happened.
    pub errors: Vec<String>,
    pub outcomes: Vec<ActionRecord>,
    #[serde(rename = "loop")]
    pub loop_state: LoopState,
    pub start_time: DateTime<Utc>,
    /// Set when the cycle stopped on an unrecoverable error.
    pub halted: Option<String>,
    pub tokens_used: u64,
}

impl WorkflowState {
    /// Fresh state for a new invocation.
    pub fn new(scope: Scope, max_iterations: u32, start_time: DateTime<Utc>) -> Self {
        Self {
            scope,
            step: Step::Observe,
            observation: Map::new(),
            reasoning: None,
            executed_actions: vec![],
            errors: vec![],
            outcomes: vec![],
            loop_state: LoopState {
                iteration: 1,
                max_iterations,
                changed_world: false,
            },
            start_time,
            halted: None,
            tokens_used: 0,
        }
    }

    pub fn iteration(&self) -> u32 {
        self.loop_state.iteration
    }

    pub fn record_error(&mut self, step: Step, error: impl std::fmt::Display) {
        self.errors.push(format!("{}: {error}", step.as_str()));
    }

    pub fn record_outcome(&mut self, tool: &str, outcome: ActionOutcome) {
        self.outcomes.push(ActionRecord {
            iteration: self.loop_state.iteration,
            tool: tool.to_string(),
            outcome,
        });
    }

    /// Outcomes that were throttled, across all iterations.
    pub fn heat_blocked(&self) -> impl Iterator<Item = &ActionRecord> {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, ActionOutcome::HeatBlocked { .. }))
    }

    /// Whether the cycle ran to a normal stop.
    pub fn succeeded(&self) -> bool {
        self.halted.is_none()
    }

    /// One-line summary for logs, traces and run records.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} action(s) in {} iteration(s)",
            self.executed_actions.len(),
            self.loop_state.iteration
        );
        if !self.errors.is_empty() {
            s.push_str(&format!(", {} error(s)", self.errors.len()));
        }
        if let Some(reason) = &self.halted {
            s.push_str(&format!(", halted: {reason}"));
        }
        s
    }
}
