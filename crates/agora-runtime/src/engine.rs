//! The universal decision cycle: Observe → Reason → Act → Loop.
//!
//! One [`WorkflowState`] is threaded through a single invocation and handed
//! back at the end, halted or not, so whatever already executed is never
//! lost from the audit trail.

use agora_autonomy::{EscalationTracker, HeatLimiter, TokenBudget};
use agora_config::schema::EngineConfig;
use agora_core::{
    Actor, AgoraError, Clock, EventBus, Message, Result, Role, Scope, Subject, SubjectKind,
    ToolCall, ToolCategory, ToolOutput, ToolSchema, Trigger, TriggerKind, WorldEvent,
};
use agora_llm::{LlmProvider, LlmRequest, LlmResponse};
use agora_store::SqliteStore;
use futures::FutureExt;
use serde_json::{Value, json};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::state::{ActionOutcome, Reasoning, Step, WorkflowState};
use crate::supervisor::{TaskSupervisor, panic_message};
use crate::tools::{BuiltinTool, ToolContext, ToolDefinition, ToolRegistry};
use crate::trace::{InvocationContext, Tracer};

/// Event name of cycles started by an `@mention`. Such cycles never fan out
/// further mentions.
pub const MENTION_TRIGGER: &str = "mention";

/// Everything the engine needs, wired once at startup.
pub struct EngineDeps {
    pub config: EngineConfig,
    pub llm: Arc<dyn LlmProvider>,
    pub registry: Arc<ToolRegistry>,
    pub heat: HeatLimiter,
    pub escalation: EscalationTracker,
    pub budget: TokenBudget,
    pub tracer: Tracer,
    pub store: SqliteStore,
    pub supervisor: TaskSupervisor,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
}

/// Runs decision cycles. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineDeps>,
}

impl Engine {
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            inner: Arc::new(deps),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    pub fn heat(&self) -> &HeatLimiter {
        &self.inner.heat
    }

    pub fn escalation(&self) -> &EscalationTracker {
        &self.inner.escalation
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.inner.budget
    }

    pub fn tracer(&self) -> &Tracer {
        &self.inner.tracer
    }

    pub fn store(&self) -> &SqliteStore {
        &self.inner.store
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.inner.supervisor
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn create_initial_state(&self, scope: Scope) -> WorkflowState {
        WorkflowState::new(
            scope,
            self.inner.config.max_iterations.max(1),
            self.inner.clock.now(),
        )
    }

    /// A complete top-level invocation: fresh tracing context, workflow run
    /// opened and closed around the cycle.
    pub async fn run_cycle(&self, scope: Scope) -> WorkflowState {
        let ctx = InvocationContext::new();
        let started = Instant::now();
        let run_id = self.inner.tracer.start_workflow_trace(&ctx, &scope).await;

        let state = self
            .execute_universal_workflow(self.create_initial_state(scope), &ctx)
            .await;

        self.inner
            .tracer
            .end_workflow_trace(
                &ctx,
                run_id,
                state.succeeded(),
                started.elapsed(),
                state.executed_actions.len(),
                &state.summary(),
            )
            .await;
        info!(
            actor = %state.scope.actor().id,
            trigger = %state.scope.trigger().name,
            actions = ?state.executed_actions,
            iterations = state.iteration(),
            errors = state.errors.len(),
            halted = state.halted.is_some(),
            "decision cycle finished"
        );
        state
    }

    /// Drive `state` through the cycle until Loop says stop. Never fails;
    /// problems end up in `state.errors` and, if fatal, `state.halted`.
    pub async fn execute_universal_workflow(
        &self,
        mut state: WorkflowState,
        ctx: &InvocationContext,
    ) -> WorkflowState {
        loop {
            state.step = Step::Observe;
            self.observe(&mut state, ctx).await;

            state.step = Step::Reason;
            self.reason(&mut state, ctx).await;
            if state.halted.is_some() {
                break;
            }

            state.step = Step::Act;
            self.act(&mut state, ctx).await;
            if state.halted.is_some() {
                break;
            }

            state.step = Step::Loop;
            if !self.decide_loop(&mut state, ctx).await {
                break;
            }
        }
        state.step = Step::Done;
        state
    }

    // ── Observe ────────────────────────────────────────────────

    async fn observe(&self, state: &mut WorkflowState, ctx: &InvocationContext) {
        let node = self
            .inner
            .tracer
            .start_node_trace(ctx, "observe", json!({ "iteration": state.iteration() }))
            .await;
        let tool_ctx = tool_context(&state.scope);

        for (tool, input) in observation_plan(&state.scope) {
            let result = match self.inner.registry.resolve_builtin(tool) {
                Ok(def) => self.invoke(def, input, tool_ctx.clone(), ctx).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(output) => {
                    state.observation.insert(tool.name().to_string(), output.content);
                }
                Err(e @ AgoraError::HandlerPanic { .. }) => {
                    // Reads never end the cycle, not even a panicking one.
                    error!(tool = %tool, error = %e, "data tool panicked, observation incomplete");
                    state.record_error(Step::Observe, &e);
                }
                Err(e) => {
                    warn!(tool = %tool, error = %e, "observation incomplete");
                    state.record_error(Step::Observe, &e);
                }
            }
        }

        let keys: Vec<&String> = state.observation.keys().collect();
        let outputs = json!({ "observed": keys });
        self.inner
            .tracer
            .end_node_trace(ctx, node, outputs, None)
            .await;
    }

    // ── Reason ─────────────────────────────────────────────────

    async fn reason(&self, state: &mut WorkflowState, ctx: &InvocationContext) {
        let tools = self.callable_tools(&state.scope);
        let node = self
            .inner
            .tracer
            .start_node_trace(
                ctx,
                "reason",
                json!({
                    "iteration": state.iteration(),
                    "tools": tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                }),
            )
            .await;

        let request = self.build_request(state, tools);
        match self.complete(&request, ctx).await {
            Ok(response) => {
                let tokens = response.usage.total_tokens() as u64;
                state.tokens_used += tokens;
                if let Err(e) = self.inner.budget.record(tokens) {
                    warn!(actor = %state.scope.actor().id, error = %e, "cycle ran past the token budget");
                }
                let calls: Vec<&str> = response
                    .tool_calls
                    .iter()
                    .map(|c| c.tool_name.as_str())
                    .collect();
                debug!(actor = %state.scope.actor().id, calls = ?calls, "model answered");
                let outputs = json!({ "tool_calls": calls, "tokens": tokens });
                state.reasoning = Some(Reasoning {
                    content: response.content,
                    tool_calls: response.tool_calls,
                });
                self.inner.tracer.end_node_trace(ctx, node, outputs, None).await;
            }
            Err(e) => {
                error!(actor = %state.scope.actor().id, error = %e, "model call failed, ending cycle");
                state.record_error(Step::Reason, &e);
                state.halted = Some(format!("reason: {e}"));
                self.inner
                    .tracer
                    .end_node_trace(ctx, node, Value::Null, Some(e.to_string()))
                    .await;
            }
        }
    }

    /// Action tools the limiter currently lets this actor use.
    fn callable_tools(&self, scope: &Scope) -> Vec<ToolSchema> {
        let actor_id = &scope.actor().id;
        self.inner
            .registry
            .by_category(ToolCategory::Action)
            .into_iter()
            .filter(|def| {
                def.name != BuiltinTool::Reply.name() || scope.conversation_id().is_some()
            })
            .filter(|def| {
                if !def.throttled {
                    return true;
                }
                match self.inner.heat.check_action(actor_id, &def.name) {
                    Ok(status) => status.allowed,
                    Err(e) => {
                        warn!(actor = %actor_id, tool = %def.name, error = %e, "heat check failed");
                        false
                    }
                }
            })
            .map(ToolDefinition::schema)
            .collect()
    }

    fn build_request(&self, state: &WorkflowState, tools: Vec<ToolSchema>) -> LlmRequest {
        let config = &self.inner.config;
        let observation = &state.observation;
        let actor = state.scope.actor();

        let handle = observation
            .get(BuiltinTool::GetProfile.name())
            .and_then(|p| p.pointer("/profile/handle"))
            .and_then(Value::as_str)
            .unwrap_or(&actor.id);
        let mut system = format!(
            "You are {handle}, an autonomous member of a small online community. \
             Act in character. Only call the tools you are given; call none if nothing is worth doing."
        );
        if let Some(persona) = observation
            .get(BuiltinTool::GetProfile.name())
            .and_then(|p| p.pointer("/profile/persona"))
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
        {
            system.push_str("\n\nPersona: ");
            system.push_str(persona);
        }
        if let Some(guidance) = observation
            .get(BuiltinTool::CountSimilarRequests.name())
            .and_then(|r| r.get("guidance"))
            .and_then(Value::as_str)
        {
            system.push_str("\n\n");
            system.push_str(guidance);
        }
        if let Some(extra) = &config.system_prompt {
            system.push_str("\n\n");
            system.push_str(extra);
        }

        let mut prompt = format!("Why you are acting now: {}\n", state.scope.describe());
        if let Some(subject) = state.scope.subject() {
            prompt.push_str(&format!(
                "Subject: {}\n",
                serde_json::to_string(subject).unwrap_or_default()
            ));
        }
        prompt.push_str(&format!(
            "\nWhat you see:\n{}\n",
            serde_json::to_string_pretty(observation).unwrap_or_default()
        ));
        let earlier: Vec<String> = state
            .outcomes
            .iter()
            .map(|r| format!("- {} ({:?})", r.tool, r.outcome))
            .collect();
        if !earlier.is_empty() {
            prompt.push_str("\nAlready done in this cycle:\n");
            prompt.push_str(&earlier.join("\n"));
            prompt.push('\n');
        }

        let mut request = LlmRequest::new(config.model.clone());
        request.system = Some(system);
        request.messages = vec![Message::text(Role::User, prompt)];
        request.tools = tools;
        request.max_tokens = config.max_tokens;
        request.temperature = config.temperature;
        request
    }

    /// One model call with a per-attempt timeout, retried at most once on a
    /// transient failure. Every attempt is traced.
    async fn complete(&self, request: &LlmRequest, ctx: &InvocationContext) -> Result<LlmResponse> {
        let config = &self.inner.config;
        let attempts = config.llm_retries.min(1) + 1;
        let secs = config.llm_timeout_secs.max(1);

        let mut attempt = 1;
        loop {
            let started_at = self.inner.clock.now();
            let result = match tokio::time::timeout(
                Duration::from_secs(secs),
                self.inner.llm.complete(request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AgoraError::LlmTimeout { secs }),
            };

            let inputs = json!({
                "attempt": attempt,
                "messages": request.messages.len(),
                "tools": request.tools.len(),
            });
            let (outputs, err) = match &result {
                Ok(r) => (
                    json!({
                        "content": r.content,
                        "tool_calls": r.tool_calls.len(),
                        "input_tokens": r.usage.input_tokens,
                        "output_tokens": r.usage.output_tokens,
                    }),
                    None,
                ),
                Err(e) => (Value::Null, Some(e.to_string())),
            };
            self.inner
                .tracer
                .trace_llm_call(ctx, &request.model, inputs, outputs, err, started_at)
                .await;

            match result {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(model = %request.model, attempt, error = %e, "model call failed, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    // ── Act ────────────────────────────────────────────────────

    async fn act(&self, state: &mut WorkflowState, ctx: &InvocationContext) {
        let calls = state
            .reasoning
            .as_ref()
            .map(|r| r.tool_calls.clone())
            .unwrap_or_default();
        if calls.is_empty() {
            return;
        }
        let node = self
            .inner
            .tracer
            .start_node_trace(
                ctx,
                "act",
                json!({
                    "iteration": state.iteration(),
                    "calls": calls.iter().map(|c| c.tool_name.as_str()).collect::<Vec<_>>(),
                }),
            )
            .await;
        let tool_ctx = tool_context(&state.scope);

        for call in &calls {
            self.act_one(state, call, &tool_ctx, ctx).await;
            if state.halted.is_some() {
                break;
            }
        }

        let outputs = json!({
            "executed": state.executed_actions.len(),
            "changed_world": state.loop_state.changed_world,
        });
        self.inner
            .tracer
            .end_node_trace(ctx, node, outputs, state.halted.clone())
            .await;
    }

    async fn act_one(
        &self,
        state: &mut WorkflowState,
        call: &ToolCall,
        tool_ctx: &ToolContext,
        ctx: &InvocationContext,
    ) {
        let name = call.tool_name.as_str();
        let def = match self.inner.registry.resolve_in(name, ToolCategory::Action) {
            Ok(def) => def,
            Err(e) => return reject(state, name, e),
        };
        if let Some(param) = def.missing_params(&call.arguments).into_iter().next() {
            let e = AgoraError::MissingParameter {
                tool: name.to_string(),
                param,
            };
            return reject(state, name, e);
        }

        let actor_id = tool_ctx.agent_id.as_str();
        if def.throttled {
            match self.inner.heat.check_action(actor_id, name) {
                Ok(status) if !status.allowed => {
                    info!(
                        actor = actor_id,
                        tool = name,
                        heat = status.current_heat,
                        cooldown_minutes = status.cooldown_minutes,
                        "action blocked by heat"
                    );
                    state.record_outcome(
                        name,
                        ActionOutcome::HeatBlocked {
                            current_heat: status.current_heat,
                            cooldown_minutes: status.cooldown_minutes,
                        },
                    );
                    self.inner.events.publish(WorldEvent::ActionBlocked {
                        actor_id: actor_id.to_string(),
                        tool: name.to_string(),
                        current_heat: status.current_heat,
                    });
                    return;
                }
                Ok(_) => {}
                Err(e) => return fail(state, name, e),
            }
        }

        match self
            .invoke(def, call.arguments.clone(), tool_ctx.clone(), ctx)
            .await
        {
            Ok(output) => {
                state.executed_actions.push(name.to_string());
                state.record_outcome(
                    name,
                    ActionOutcome::Executed {
                        changed_world: output.changed_world,
                    },
                );
                if output.changed_world {
                    state.loop_state.changed_world = true;
                    if def.throttled {
                        if let Err(e) =
                            self.inner
                                .heat
                                .apply_heat(actor_id, name, output.target_id.as_deref())
                        {
                            warn!(actor = actor_id, tool = name, error = %e, "failed to apply heat");
                        }
                    }
                }
                self.inner.events.publish(WorldEvent::ActionExecuted {
                    actor_id: actor_id.to_string(),
                    tool: name.to_string(),
                    target_id: output.target_id.clone(),
                });
                if !output.mentions.is_empty() {
                    self.fire_mentions(&state.scope, &output);
                }
            }
            Err(e @ AgoraError::HandlerPanic { .. }) => {
                error!(actor = actor_id, tool = name, error = %e, "tool handler panicked, halting cycle");
                state.halted = Some(e.to_string());
                fail(state, name, e);
            }
            Err(e) => fail(state, name, e),
        }
    }

    /// Run a handler under the tool timeout, turning a panic into
    /// [`AgoraError::HandlerPanic`]. Traced as a leaf of the current run.
    async fn invoke(
        &self,
        def: &ToolDefinition,
        input: Value,
        tool_ctx: ToolContext,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput> {
        let started_at = self.inner.clock.now();
        let timeout = Duration::from_secs(self.inner.config.tool_timeout_secs.max(1));
        let call = AssertUnwindSafe(def.handler.call(input.clone(), tool_ctx)).catch_unwind();

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(AgoraError::HandlerPanic {
                tool: def.name.clone(),
                reason: panic_message(&*panic),
            }),
            Err(_) => Err(AgoraError::ToolTimeout(def.name.clone())),
        };

        let (outputs, err) = match &result {
            Ok(output) => (serde_json::to_value(output).unwrap_or(Value::Null), None),
            Err(e) => (Value::Null, Some(e.to_string())),
        };
        self.inner
            .tracer
            .trace_tool_execution(ctx, &def.name, input, outputs, err, started_at)
            .await;
        result
    }

    /// Start one detached `mention` cycle per mentioned agent.
    fn fire_mentions(&self, scope: &Scope, output: &ToolOutput) {
        if scope.trigger().name == MENTION_TRIGGER {
            debug!(actor = %scope.actor().id, "mention cycles do not fan out");
            return;
        }
        let Some(target_id) = output.target_id.as_deref() else {
            return;
        };
        let kind = if output.content.get("comment_id").is_some() {
            SubjectKind::Comment
        } else {
            SubjectKind::Post
        };
        let payload = json!({
            "author_id": scope.actor().id,
            "post_id": output.content.get("post_id"),
        });

        for agent_id in &output.mentions {
            let mention_scope = Scope::new(
                Trigger::event(MENTION_TRIGGER, self.inner.clock.now()),
                Actor::agent(agent_id.clone()),
            )
            .with_subject(Subject::new(target_id, kind.clone(), payload.clone()));
            let task = self.inner.supervisor.spawn(
                format!("mention:{agent_id}"),
                mention_cycle(self.clone(), mention_scope),
            );
            debug!(task = task.label(), by = %scope.actor().id, "mention cycle spawned");
        }
    }

    // ── Loop ───────────────────────────────────────────────────

    /// Continue only while nothing halted, the iteration cap is not
    /// reached and this iteration changed the world.
    async fn decide_loop(&self, state: &mut WorkflowState, ctx: &InvocationContext) -> bool {
        let lp = &state.loop_state;
        let proceed = state.halted.is_none() && lp.iteration < lp.max_iterations && lp.changed_world;
        let node = self
            .inner
            .tracer
            .start_node_trace(
                ctx,
                "loop",
                json!({
                    "iteration": lp.iteration,
                    "max_iterations": lp.max_iterations,
                    "changed_world": lp.changed_world,
                }),
            )
            .await;

        if proceed {
            state.loop_state.iteration += 1;
            state.loop_state.changed_world = false;
            state.reasoning = None;
        }
        self.inner
            .tracer
            .end_node_trace(ctx, node, json!({ "continue": proceed }), None)
            .await;
        proceed
    }
}

/// Boxed so the spawned cycle does not make `run_cycle`'s future type
/// contain itself.
fn mention_cycle(engine: Engine, scope: Scope) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    Box::pin(async move {
        let state = engine.run_cycle(scope).await;
        match state.halted {
            Some(reason) => Err(AgoraError::Engine(format!("mention cycle halted: {reason}"))),
            None => Ok(()),
        }
    })
}

/// Data tools to read for this scope, in order.
fn observation_plan(scope: &Scope) -> Vec<(BuiltinTool, Value)> {
    let mut plan = vec![
        (BuiltinTool::GetProfile, json!({})),
        (BuiltinTool::GetRelationships, json!({})),
    ];
    if scope.trigger().kind == TriggerKind::Schedule {
        plan.push((BuiltinTool::GetFeed, json!({})));
    }
    if let Some(post_id) = scope.subject().and_then(Subject::post_id) {
        plan.push((BuiltinTool::GetPost, json!({ "post_id": post_id })));
    }
    if scope.conversation_id().is_some() {
        plan.push((BuiltinTool::GetConversation, json!({})));
    }
    if let Some(sender) = scope.subject().and_then(Subject::sender_id) {
        if sender != scope.actor().id {
            plan.push((
                BuiltinTool::CountSimilarRequests,
                json!({ "requester_id": sender }),
            ));
        }
    }
    plan
}

/// Facts a handler may route on, taken from the scope.
fn tool_context(scope: &Scope) -> ToolContext {
    let mut ctx = ToolContext::new(scope.actor().id.clone())
        .with_meta("trigger", scope.trigger().name.clone());
    if let Some(conversation_id) = scope.conversation_id() {
        ctx = ctx.with_conversation(conversation_id);
    }
    if let Some(subject) = scope.subject() {
        ctx = ctx
            .with_meta("subject_id", subject.id.clone())
            .with_meta("subject_kind", subject.kind.as_str());
        if let Some(sender) = subject.sender_id() {
            ctx = ctx.with_meta("sender_id", sender);
        }
        if let Some(post_id) = subject.post_id() {
            ctx = ctx.with_meta("post_id", post_id);
        }
    }
    ctx
}

/// The call never ran: unknown tool, wrong category or bad arguments.
fn reject(state: &mut WorkflowState, tool: &str, e: AgoraError) {
    warn!(tool, error = %e, "tool call rejected");
    state.record_error(Step::Act, &e);
    state.record_outcome(
        tool,
        ActionOutcome::Invalid {
            reason: e.to_string(),
        },
    );
}

fn fail(state: &mut WorkflowState, tool: &str, e: AgoraError) {
    warn!(tool, error = %e, "tool call failed");
    state.record_error(Step::Act, &e);
    state.record_outcome(
        tool,
        ActionOutcome::Failed {
            reason: e.to_string(),
        },
    );
}
