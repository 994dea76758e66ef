//! # Workflow scheduler
//!
//! Runs the named workflows: on a timer (`Every` interval or cron
//! expression), or right now on behalf of a trigger. Every invocation ends
//! in exactly one appended [`WorkflowRunRecord`].
//!
//! A job key that is still running is not started again: the second
//! attempt returns `Skipped` ("already running") and is recorded like any
//! other run. Event-driven keys are exempt since chats for different
//! actors run side by side.

use agora_autonomy::TokenBudget;
use agora_config::schema::{MaintenanceConfig, SchedulerConfig};
use agora_config::JobSchedule;
use agora_core::{
    Actor, AgoraError, Clock, EventBus, Result, Scope, Subject, Trigger, WorkflowKey, WorldEvent,
};
use agora_store::{RunStatus, SqliteStore, WorkflowRunRecord};
use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::maintenance;
use crate::state::WorkflowState;
use crate::supervisor::TaskSupervisor;

/// Event name of cycles started by an inbound chat message.
pub const CHAT_TRIGGER: &str = "chat_message";

/// Who asked for a run and, for chat, about what.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// "timer", "manual", "cron" or "chat".
    pub trigger: String,
    pub actor_id: Option<String>,
    pub subject: Option<Subject>,
    pub conversation_id: Option<String>,
}

impl RunContext {
    pub fn timer() -> Self {
        Self::named("timer")
    }

    pub fn manual() -> Self {
        Self::named("manual")
    }

    /// An external cron caller.
    pub fn cron() -> Self {
        Self::named("cron")
    }

    pub fn chat(
        actor_id: impl Into<String>,
        subject: Subject,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            trigger: "chat".into(),
            actor_id: Some(actor_id.into()),
            subject: Some(subject),
            conversation_id,
        }
    }

    fn named(trigger: &str) -> Self {
        Self {
            trigger: trigger.into(),
            ..Default::default()
        }
    }
}

/// What one decision cycle did, as kept in run results and records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub actor_id: String,
    pub executed_actions: Vec<String>,
    pub iterations: u32,
    pub errors: Vec<String>,
    pub halted: Option<String>,
    pub tokens_used: u64,
}

impl From<&WorkflowState> for CycleSummary {
    fn from(state: &WorkflowState) -> Self {
        Self {
            actor_id: state.scope.actor().id.clone(),
            executed_actions: state.executed_actions.clone(),
            iterations: state.iteration(),
            errors: state.errors.clone(),
            halted: state.halted.clone(),
            tokens_used: state.tokens_used,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub key: String,
    pub status: RunStatus,
    pub message: String,
    pub data: Value,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cycles: Vec<CycleSummary>,
}

impl WorkflowRunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
}

/// Snapshot of one job for status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub key: String,
    pub state: JobState,
    /// `every 900s`, `cron 0 0 3 * * *`, or none for unscheduled keys.
    pub schedule: Option<String>,
    pub last_status: Option<RunStatus>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub next_due: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct JobEntry {
    schedule: Option<JobSchedule>,
    running: bool,
    last_status: Option<RunStatus>,
    last_started_at: Option<DateTime<Utc>>,
    last_finished_at: Option<DateTime<Utc>>,
    next_due: Option<DateTime<Utc>>,
}

pub struct SchedulerDeps {
    pub engine: Engine,
    pub store: SqliteStore,
    pub budget: TokenBudget,
    pub scheduler: SchedulerConfig,
    pub maintenance: MaintenanceConfig,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub supervisor: TaskSupervisor,
}

struct Inner {
    deps: SchedulerDeps,
    jobs: Mutex<HashMap<WorkflowKey, JobEntry>>,
}

/// Cheap to clone; clones share job state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// Body of a finished run before it becomes a result and a record.
struct Outcome {
    status: RunStatus,
    message: String,
    data: Value,
    error: Option<String>,
    cycles: Vec<CycleSummary>,
}

impl Outcome {
    fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
            data,
            error: None,
            cycles: vec![],
        }
    }

    fn skipped(reason: &str) -> Self {
        Self {
            status: RunStatus::Skipped,
            message: reason.to_string(),
            data: Value::Null,
            error: None,
            cycles: vec![],
        }
    }

    fn failed(error: AgoraError) -> Self {
        Self {
            status: RunStatus::Error,
            message: "workflow failed".into(),
            data: Value::Null,
            error: Some(error.to_string()),
            cycles: vec![],
        }
    }
}

/// Holds a job's running slot; releasing it returns the job to `Idle`
/// even when the run future is dropped half way.
struct Claim {
    inner: Arc<Inner>,
    key: WorkflowKey,
    exclusive: bool,
    status: Option<RunStatus>,
}

impl Claim {
    fn finish(&mut self, status: RunStatus) {
        self.status = Some(status);
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let now = self.inner.deps.clock.now();
        let mut jobs = self.inner.jobs.lock();
        let entry = jobs.entry(self.key).or_default();
        if self.exclusive {
            entry.running = false;
        }
        entry.last_status = Some(self.status.unwrap_or(RunStatus::Error));
        entry.last_finished_at = Some(now);
    }
}

impl Scheduler {
    pub fn new(deps: SchedulerDeps) -> Self {
        let now = deps.clock.now();
        let mut jobs: HashMap<WorkflowKey, JobEntry> = WorkflowKey::ALL
            .into_iter()
            .map(|k| (k, JobEntry::default()))
            .collect();

        for job in deps.scheduler.jobs.iter().filter(|j| j.enabled) {
            let Some(key) = WorkflowKey::parse(&job.key) else {
                warn!(job = %job.key, "ignoring schedule for unknown workflow");
                continue;
            };
            if key.is_event_driven() {
                warn!(job = %job.key, "event-driven workflows are never scheduled");
                continue;
            }
            let Some(schedule) = job.schedule() else {
                warn!(job = %job.key, "job has no schedule");
                continue;
            };
            let entry = jobs.entry(key).or_default();
            entry.next_due = next_after(&schedule, now);
            debug!(job = %key, schedule = %describe(&schedule), next_due = ?entry.next_due, "job scheduled");
            entry.schedule = Some(schedule);
        }

        Self {
            inner: Arc::new(Inner {
                deps,
                jobs: Mutex::new(jobs),
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.deps.engine
    }

    pub fn store(&self) -> &SqliteStore {
        &self.inner.deps.store
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.inner.deps.supervisor
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.deps.scheduler
    }

    /// Run by name; unknown names are an error.
    pub async fn run_named(&self, key: &str, ctx: RunContext) -> Result<WorkflowRunResult> {
        let key = WorkflowKey::parse(key).ok_or_else(|| AgoraError::UnknownWorkflow(key.into()))?;
        Ok(self.run_workflow(key, ctx).await)
    }

    /// Run one workflow now and record it. Never fails; errors are in the
    /// result's status.
    pub async fn run_workflow(&self, key: WorkflowKey, ctx: RunContext) -> WorkflowRunResult {
        let started_at = self.inner.deps.clock.now();

        let outcome = match self.claim(key, started_at) {
            None => {
                info!(job = %key, trigger = %ctx.trigger, "job still running, skipping");
                Outcome::skipped("already running")
            }
            Some(mut claim) => {
                self.inner.deps.events.publish(WorldEvent::JobStarted {
                    key: key.as_str().to_string(),
                    at: started_at,
                });
                let outcome = match self.dispatch(key, &ctx).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(job = %key, error = %e, "workflow failed");
                        Outcome::failed(e)
                    }
                };
                claim.finish(outcome.status);
                outcome
            }
        };

        let finished_at = self.inner.deps.clock.now();
        let result = WorkflowRunResult {
            key: key.as_str().to_string(),
            status: outcome.status,
            message: outcome.message,
            data: outcome.data,
            error: outcome.error,
            started_at,
            finished_at,
            cycles: outcome.cycles,
        };
        self.record(&result, &ctx.trigger);
        self.inner.deps.events.publish(WorldEvent::JobFinished {
            key: result.key.clone(),
            status: result.status.as_str().into(),
            at: finished_at,
        });
        debug!(job = %key, status = %result.status, message = %result.message, "workflow run recorded");
        result
    }

    fn claim(&self, key: WorkflowKey, now: DateTime<Utc>) -> Option<Claim> {
        let exclusive = !key.is_event_driven();
        let mut jobs = self.inner.jobs.lock();
        let entry = jobs.entry(key).or_default();
        if exclusive {
            if entry.running {
                return None;
            }
            entry.running = true;
        }
        entry.last_started_at = Some(now);
        Some(Claim {
            inner: Arc::clone(&self.inner),
            key,
            exclusive,
            status: None,
        })
    }

    async fn dispatch(&self, key: WorkflowKey, ctx: &RunContext) -> Result<Outcome> {
        let deps = &self.inner.deps;
        match key {
            WorkflowKey::AgentCycle => self.agent_cycle().await,
            WorkflowKey::AgentChat => self.agent_chat(ctx).await,
            WorkflowKey::RelationshipDecay => {
                let data = maintenance::relationship_decay(&deps.store, &deps.maintenance)?;
                Ok(Outcome::success("relationships decayed", data))
            }
            WorkflowKey::MemoryCleanup => {
                let data = maintenance::memory_cleanup(&deps.store, &deps.maintenance)?;
                Ok(Outcome::success("memories cleaned up", data))
            }
            WorkflowKey::TokenBudgetReset => {
                let before = deps.budget.snapshot();
                deps.budget.reset();
                Ok(Outcome::success(
                    "token budget reset",
                    json!({ "spent_before_reset": before.daily_tokens }),
                ))
            }
        }
    }

    /// One decision cycle per active agent, bounded concurrency.
    async fn agent_cycle(&self) -> Result<Outcome> {
        let deps = &self.inner.deps;
        if deps.store.is_paused()? {
            return Ok(Outcome::skipped("scheduler paused"));
        }
        if !deps.budget.has_remaining() {
            return Ok(Outcome::skipped("daily token budget exhausted"));
        }

        let agents = deps.store.active_agents()?;
        let at = deps.clock.now();
        let concurrency = deps.engine.config().max_concurrent_cycles.max(1);
        let states: Vec<WorkflowState> = futures::stream::iter(agents.into_iter().map(|agent| {
            let engine = deps.engine.clone();
            let scope = Scope::new(
                Trigger::schedule(WorkflowKey::AgentCycle.as_str(), at),
                Actor::agent(agent.id),
            );
            async move { engine.run_cycle(scope).await }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        let cycles: Vec<CycleSummary> = states.iter().map(CycleSummary::from).collect();
        let actions: usize = cycles.iter().map(|c| c.executed_actions.len()).sum();
        let halted = cycles.iter().filter(|c| c.halted.is_some()).count();
        let data = json!({ "agents": cycles.len(), "actions": actions, "halted": halted });

        if halted > 0 && halted == cycles.len() {
            return Ok(Outcome {
                status: RunStatus::Error,
                message: format!("all {halted} cycle(s) halted"),
                data,
                error: cycles.iter().find_map(|c| c.halted.clone()),
                cycles,
            });
        }
        Ok(Outcome {
            status: RunStatus::Success,
            message: format!("{} agent(s), {actions} action(s)", cycles.len()),
            data,
            error: None,
            cycles,
        })
    }

    async fn agent_chat(&self, ctx: &RunContext) -> Result<Outcome> {
        let deps = &self.inner.deps;
        let actor_id = ctx
            .actor_id
            .clone()
            .ok_or_else(|| AgoraError::Engine("agent_chat needs an actor".into()))?;
        let mut scope = Scope::new(
            Trigger::event(CHAT_TRIGGER, deps.clock.now()),
            Actor::agent(actor_id),
        );
        if let Some(subject) = &ctx.subject {
            scope = scope.with_subject(subject.clone());
        }
        if let Some(conversation_id) = &ctx.conversation_id {
            scope = scope.with_conversation(conversation_id.clone());
        }

        let state = deps.engine.run_cycle(scope).await;
        let summary = CycleSummary::from(&state);
        let data = json!({
            "executed_actions": summary.executed_actions,
            "iterations": summary.iterations,
        });
        Ok(match &state.halted {
            Some(reason) => Outcome {
                status: RunStatus::Error,
                message: "chat cycle halted".into(),
                data,
                error: Some(reason.clone()),
                cycles: vec![summary],
            },
            None => Outcome {
                status: RunStatus::Success,
                message: state.summary(),
                data,
                error: None,
                cycles: vec![summary],
            },
        })
    }

    fn record(&self, result: &WorkflowRunResult, trigger: &str) {
        let mut data = result.data.clone();
        if !result.cycles.is_empty() {
            let cycles = serde_json::to_value(&result.cycles).unwrap_or(Value::Null);
            match data.as_object_mut() {
                Some(obj) => {
                    obj.insert("cycles".into(), cycles);
                }
                None => data = json!({ "cycles": cycles }),
            }
        }
        let record = WorkflowRunRecord {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_key: result.key.clone(),
            status: result.status,
            message: result.message.clone(),
            trigger: trigger.to_string(),
            started_at: result.started_at,
            finished_at: result.finished_at,
            data,
            error: result.error.clone(),
        };
        if let Err(e) = self.inner.deps.store.append_run(&record) {
            warn!(job = %result.key, error = %e, "failed to record workflow run");
        }
    }

    // ── Timer ──────────────────────────────────────────────────

    /// Fire every job whose time has come and return their keys. Runs are
    /// detached through the supervisor.
    pub fn tick(&self) -> Vec<WorkflowKey> {
        let now = self.inner.deps.clock.now();
        let due: Vec<WorkflowKey> = {
            let mut jobs = self.inner.jobs.lock();
            WorkflowKey::ALL
                .into_iter()
                .filter(|key| {
                    let Some(entry) = jobs.get_mut(key) else {
                        return false;
                    };
                    let (Some(schedule), Some(next)) = (&entry.schedule, entry.next_due) else {
                        return false;
                    };
                    if next > now {
                        return false;
                    }
                    entry.next_due = next_after(schedule, now);
                    true
                })
                .collect()
        };

        for key in &due {
            let scheduler = self.clone();
            let key = *key;
            self.inner
                .deps
                .supervisor
                .spawn(format!("job:{key}"), async move {
                    scheduler.run_workflow(key, RunContext::timer()).await;
                    Ok(())
                });
        }
        due
    }

    /// Tick on an interval until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let config = &self.inner.deps.scheduler;
        if !config.enabled {
            info!("scheduler disabled, timer loop not started");
            shutdown.cancelled().await;
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(config.tick_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_secs = config.tick_secs, "scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    let fired = self.tick();
                    if !fired.is_empty() {
                        debug!(jobs = ?fired, "scheduler fired jobs");
                    }
                }
            }
        }
    }

    // ── Control ────────────────────────────────────────────────

    pub fn pause(&self) -> Result<()> {
        self.inner.deps.store.set_paused(true)?;
        self.inner.deps.events.publish(WorldEvent::SchedulerPaused);
        info!("scheduler paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.inner.deps.store.set_paused(false)?;
        self.inner.deps.events.publish(WorldEvent::SchedulerResumed);
        info!("scheduler resumed");
        Ok(())
    }

    pub fn is_paused(&self) -> Result<bool> {
        self.inner.deps.store.is_paused()
    }

    pub fn job_states(&self) -> Vec<JobStatus> {
        let jobs = self.inner.jobs.lock();
        WorkflowKey::ALL
            .into_iter()
            .filter_map(|key| {
                let entry = jobs.get(&key)?;
                Some(JobStatus {
                    key: key.as_str().to_string(),
                    state: if entry.running {
                        JobState::Running
                    } else {
                        JobState::Idle
                    },
                    schedule: entry.schedule.as_ref().map(describe),
                    last_status: entry.last_status,
                    last_started_at: entry.last_started_at,
                    last_finished_at: entry.last_finished_at,
                    next_due: entry.next_due,
                })
            })
            .collect()
    }
}

/// The first time strictly after `now` the schedule fires.
fn next_after(schedule: &JobSchedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        JobSchedule::Every { secs } => Some(now + chrono::Duration::seconds((*secs).max(1) as i64)),
        JobSchedule::Cron { expression } => match Schedule::from_str(expression) {
            Ok(schedule) => schedule.after(&now).next(),
            Err(e) => {
                error!(cron = %expression, error = %e, "invalid cron expression, job disabled");
                None
            }
        },
    }
}

fn describe(schedule: &JobSchedule) -> String {
    match schedule {
        JobSchedule::Every { secs } => format!("every {secs}s"),
        JobSchedule::Cron { expression } => format!("cron {expression}"),
    }
}
