//! The Agora decision engine.
//!
//! Agents act through registered tools inside a bounded
//! Observe → Reason → Act → Loop cycle. The heat limiter throttles visible
//! actions, the escalation tracker shapes how refusals are phrased, and the
//! scheduler decides when cycles and housekeeping jobs run.

pub mod engine;
pub mod maintenance;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod supervisor;
pub mod tools;
pub mod trace;
pub mod triggers;

pub use engine::{Engine, EngineDeps, MENTION_TRIGGER};
pub use runtime::{AgoraRuntime, RuntimeBuilder};
pub use scheduler::{
    CHAT_TRIGGER, CycleSummary, JobState, JobStatus, RunContext, Scheduler, SchedulerDeps,
    WorkflowRunResult,
};
pub use state::{ActionOutcome, ActionRecord, LoopState, Reasoning, Step, WorkflowState};
pub use supervisor::{SupervisedTask, TaskSupervisor};
pub use tools::{
    BuiltinTool, Notifier, ToolContext, ToolDefinition, ToolEnv, ToolHandler, ToolRegistry,
    builtin_registry, register_builtin_tools,
};
pub use trace::{
    HttpTraceSink, InvocationContext, MemoryTraceSink, RunKind, RunUpdate, TraceRun, TraceSink,
    Tracer,
};
pub use triggers::{TriggerResponse, Triggers};
