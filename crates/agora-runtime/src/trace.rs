//! Hierarchical run tracing.
//!
//! Every top-level workflow gets its own [`InvocationContext`] holding the
//! stack of open runs. The context is passed explicitly through Observe,
//! Reason, Act and every tracing call, so concurrent invocations (including
//! detached mention cycles) never see each other's stacks, whatever task
//! they resume on.
//!
//! Tracing is best-effort: with no sink configured every call is a no-op
//! returning `None`, and sink failures are logged and swallowed.

use agora_core::{AgoraError, Clock, Result, RunId, Scope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Workflow,
    Node,
    ModelCall,
    ToolCall,
}

impl RunKind {
    /// Run type understood by LangSmith-style collectors.
    pub fn run_type(&self) -> &'static str {
        match self {
            RunKind::Workflow => "chain",
            RunKind::Node => "chain",
            RunKind::ModelCall => "llm",
            RunKind::ToolCall => "tool",
        }
    }
}

/// One span in the trace tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRun {
    pub id: RunId,
    pub parent_id: Option<RunId>,
    pub kind: RunKind,
    pub name: String,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Closing fields for a run opened earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunUpdate {
    pub outputs: Value,
    pub end_time: DateTime<Utc>,
    pub error: Option<String>,
}

/// Where trace runs are shipped.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn create_run(&self, run: &TraceRun) -> Result<()>;
    async fn update_run(&self, id: RunId, update: &RunUpdate) -> Result<()>;
}

// ── Invocation context ─────────────────────────────────────────

/// Per-invocation tracing scope: the stack of currently open runs.
///
/// Clones share the stack; a new top-level workflow must use
/// [`InvocationContext::new`].
#[derive(Debug, Clone)]
pub struct InvocationContext {
    id: Uuid,
    stack: Arc<Mutex<Vec<RunId>>>,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The innermost open run.
    pub fn current(&self) -> Option<RunId> {
        self.stack.lock().last().copied()
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    pub fn open_runs(&self) -> Vec<RunId> {
        self.stack.lock().clone()
    }

    fn push(&self, id: RunId) {
        self.stack.lock().push(id);
    }

    /// Close `id`. Returns false when it was not the innermost run, in which
    /// case the id is removed wherever it sits and the stack is cleared.
    fn close(&self, id: RunId) -> bool {
        let mut stack = self.stack.lock();
        if stack.last() == Some(&id) {
            stack.pop();
            return true;
        }
        warn!(
            invocation = %self.id,
            run = %id,
            top = ?stack.last(),
            depth = stack.len(),
            "trace stack mismatch, resetting invocation stack"
        );
        stack.retain(|r| *r != id);
        stack.clear();
        false
    }
}

// ── Tracer ─────────────────────────────────────────────────────

/// Front door for all tracing calls.
#[derive(Clone)]
pub struct Tracer {
    sink: Option<Arc<dyn TraceSink>>,
    clock: Arc<dyn Clock>,
}

impl Tracer {
    pub fn new(sink: Arc<dyn TraceSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink: Some(sink),
            clock,
        }
    }

    /// A tracer that records nothing.
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self { sink: None, clock }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub async fn start_workflow_trace(
        &self,
        ctx: &InvocationContext,
        scope: &Scope,
    ) -> Option<RunId> {
        let inputs = json!({
            "trigger": scope.trigger(),
            "actor": scope.actor(),
            "subject": scope.subject(),
            "conversation_id": scope.conversation_id(),
        });
        self.open(ctx, RunKind::Workflow, &scope.describe(), inputs)
            .await
    }

    pub async fn end_workflow_trace(
        &self,
        ctx: &InvocationContext,
        run_id: Option<RunId>,
        success: bool,
        duration: Duration,
        executed_action_count: usize,
        summary: &str,
    ) {
        let outputs = json!({
            "success": success,
            "duration_ms": duration.as_millis() as u64,
            "executed_action_count": executed_action_count,
            "summary": summary,
        });
        let error = (!success).then(|| summary.to_string());
        self.close(ctx, run_id, outputs, error).await;
    }

    pub async fn start_node_trace(
        &self,
        ctx: &InvocationContext,
        node: &str,
        inputs: Value,
    ) -> Option<RunId> {
        self.open(ctx, RunKind::Node, node, inputs).await
    }

    pub async fn end_node_trace(
        &self,
        ctx: &InvocationContext,
        run_id: Option<RunId>,
        outputs: Value,
        error: Option<String>,
    ) {
        self.close(ctx, run_id, outputs, error).await;
    }

    /// Leaf span for one model call, parented to the innermost open run.
    pub async fn trace_llm_call(
        &self,
        ctx: &InvocationContext,
        model: &str,
        inputs: Value,
        outputs: Value,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) {
        self.leaf(ctx, RunKind::ModelCall, model, inputs, outputs, error, started_at)
            .await;
    }

    /// Leaf span for one tool execution, parented to the innermost open run.
    pub async fn trace_tool_execution(
        &self,
        ctx: &InvocationContext,
        tool: &str,
        inputs: Value,
        outputs: Value,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) {
        self.leaf(ctx, RunKind::ToolCall, tool, inputs, outputs, error, started_at)
            .await;
    }

    async fn open(
        &self,
        ctx: &InvocationContext,
        kind: RunKind,
        name: &str,
        inputs: Value,
    ) -> Option<RunId> {
        let sink = self.sink.as_ref()?;
        let run = TraceRun {
            id: Uuid::new_v4(),
            parent_id: ctx.current(),
            kind,
            name: name.to_string(),
            inputs,
            outputs: None,
            start_time: self.clock.now(),
            end_time: None,
            error: None,
        };
        ctx.push(run.id);
        if let Err(e) = sink.create_run(&run).await {
            warn!(run = %run.id, name, error = %e, "failed to ship trace run");
        }
        Some(run.id)
    }

    async fn close(
        &self,
        ctx: &InvocationContext,
        run_id: Option<RunId>,
        outputs: Value,
        error: Option<String>,
    ) {
        let (Some(sink), Some(id)) = (self.sink.as_ref(), run_id) else {
            return;
        };
        ctx.close(id);
        let update = RunUpdate {
            outputs,
            end_time: self.clock.now(),
            error,
        };
        if let Err(e) = sink.update_run(id, &update).await {
            warn!(run = %id, error = %e, "failed to close trace run");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn leaf(
        &self,
        ctx: &InvocationContext,
        kind: RunKind,
        name: &str,
        inputs: Value,
        outputs: Value,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        let run = TraceRun {
            id: Uuid::new_v4(),
            parent_id: ctx.current(),
            kind,
            name: name.to_string(),
            inputs,
            outputs: Some(outputs),
            start_time: started_at,
            end_time: Some(self.clock.now()),
            error,
        };
        if let Err(e) = sink.create_run(&run).await {
            warn!(run = %run.id, name, error = %e, "failed to ship trace run");
        }
    }
}

// ── Sinks ──────────────────────────────────────────────────────

/// Keeps every run in memory.
#[derive(Default)]
pub struct MemoryTraceSink {
    runs: Mutex<Vec<TraceRun>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all runs, in creation order, with updates applied.
    pub fn runs(&self) -> Vec<TraceRun> {
        self.runs.lock().clone()
    }

    pub fn get(&self, id: RunId) -> Option<TraceRun> {
        self.runs.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Runs that were opened but never closed.
    pub fn open_runs(&self) -> Vec<TraceRun> {
        self.runs
            .lock()
            .iter()
            .filter(|r| r.end_time.is_none())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn create_run(&self, run: &TraceRun) -> Result<()> {
        self.runs.lock().push(run.clone());
        Ok(())
    }

    async fn update_run(&self, id: RunId, update: &RunUpdate) -> Result<()> {
        let mut runs = self.runs.lock();
        let run = runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AgoraError::not_found("trace run", id.to_string()))?;
        run.outputs = Some(update.outputs.clone());
        run.end_time = Some(update.end_time);
        run.error = update.error.clone();
        Ok(())
    }
}

/// Ships runs to a LangSmith-compatible HTTP collector.
pub struct HttpTraceSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    project: String,
}

impl HttpTraceSink {
    pub fn new(endpoint: &str, api_key: &str, project: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgoraError::Config(format!("trace client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            project: project.to_string(),
        })
    }

    fn run_body(&self, run: &TraceRun) -> Value {
        let mut body = json!({
            "id": run.id,
            "name": run.name,
            "run_type": run.kind.run_type(),
            "inputs": run.inputs,
            "start_time": run.start_time,
            "session_name": self.project,
            "extra": { "metadata": { "kind": run.kind } },
        });
        if let Some(parent) = run.parent_id {
            body["parent_run_id"] = json!(parent);
        }
        if let Some(outputs) = &run.outputs {
            body["outputs"] = outputs.clone();
        }
        if let Some(end) = run.end_time {
            body["end_time"] = json!(end);
        }
        if let Some(error) = &run.error {
            body["error"] = json!(error);
        }
        body
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AgoraError::Other(e.into()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgoraError::Other(anyhow::anyhow!(
                "trace collector returned {status}: {body}"
            )));
        }
        debug!(status = %response.status(), "trace run shipped");
        Ok(())
    }
}

#[async_trait]
impl TraceSink for HttpTraceSink {
    async fn create_run(&self, run: &TraceRun) -> Result<()> {
        let url = format!("{}/runs", self.endpoint);
        self.send(self.client.post(url).json(&self.run_body(run)))
            .await
    }

    async fn update_run(&self, id: RunId, update: &RunUpdate) -> Result<()> {
        let url = format!("{}/runs/{id}", self.endpoint);
        let mut body = json!({
            "outputs": update.outputs,
            "end_time": update.end_time,
        });
        if let Some(error) = &update.error {
            body["error"] = json!(error);
        }
        self.send(self.client.patch(url).json(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_innermost_pops() {
        let ctx = InvocationContext::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        ctx.push(a);
        ctx.push(b);
        assert!(ctx.close(b));
        assert_eq!(ctx.open_runs(), vec![a]);
    }

    #[test]
    fn test_close_out_of_order_clears_stack() {
        let ctx = InvocationContext::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        ctx.push(a);
        ctx.push(b);
        assert!(!ctx.close(a));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_clones_share_stack_but_new_does_not() {
        let ctx = InvocationContext::new();
        let clone = ctx.clone();
        let other = InvocationContext::new();
        ctx.push(Uuid::new_v4());
        assert_eq!(clone.depth(), 1);
        assert_eq!(other.depth(), 0);
    }
}
