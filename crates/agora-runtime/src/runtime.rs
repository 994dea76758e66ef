//! Wires store, guardrails, tools, engine, scheduler and triggers together.

use agora_autonomy::{EscalationTracker, HeatLimiter, TokenBudget};
use agora_config::AgoraConfig;
use agora_core::{Clock, EventBus, Result, SystemClock};
use agora_llm::{LlmProvider, ModelRouter, OpenAiProvider};
use agora_store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::engine::{Engine, EngineDeps};
use crate::scheduler::{Scheduler, SchedulerDeps};
use crate::supervisor::TaskSupervisor;
use crate::tools::{Notifier, ToolDefinition, ToolEnv, ToolRegistry, register_builtin_tools};
use crate::trace::{HttpTraceSink, TraceSink, Tracer};
use crate::triggers::Triggers;

/// A fully wired Agora process.
#[derive(Clone)]
pub struct AgoraRuntime {
    pub config: AgoraConfig,
    pub store: SqliteStore,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    pub supervisor: TaskSupervisor,
    pub engine: Engine,
    pub scheduler: Scheduler,
    pub triggers: Triggers,
}

impl AgoraRuntime {
    pub fn builder(config: AgoraConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            store: None,
            llm: None,
            clock: None,
            trace_sink: None,
            extra_tools: vec![],
        }
    }

    /// Everything from config: store on disk, OpenAI-compatible provider,
    /// HTTP trace sink when enabled.
    pub fn from_config(config: AgoraConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Wait for detached work (mention cycles, timer runs) to finish.
    /// Returns false if `timeout` passed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let in_flight = self.supervisor.in_flight();
        if in_flight > 0 {
            info!(in_flight, "waiting for background tasks");
        }
        tokio::time::timeout(timeout, self.supervisor.wait_idle())
            .await
            .is_ok()
    }
}

pub struct RuntimeBuilder {
    config: AgoraConfig,
    store: Option<SqliteStore>,
    llm: Option<Arc<dyn LlmProvider>>,
    clock: Option<Arc<dyn Clock>>,
    trace_sink: Option<Arc<dyn TraceSink>>,
    extra_tools: Vec<ToolDefinition>,
}

impl RuntimeBuilder {
    pub fn store(mut self, store: SqliteStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    /// Register an extra tool next to the built-ins. Same name replaces.
    pub fn tool(mut self, definition: ToolDefinition) -> Self {
        self.extra_tools.push(definition);
        self
    }

    pub fn build(self) -> Result<AgoraRuntime> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = match self.store {
            Some(store) => store,
            None => SqliteStore::open_with_clock(&config.store.db_path, Arc::clone(&clock))?,
        };
        let llm = match self.llm {
            Some(llm) => llm,
            None => default_llm(&config),
        };
        let tracer = match self.trace_sink {
            Some(sink) => Tracer::new(sink, Arc::clone(&clock)),
            None => tracer_from_config(&config, Arc::clone(&clock))?,
        };

        let events = EventBus::default();
        let supervisor = TaskSupervisor::new();
        let heat = HeatLimiter::new(
            Arc::new(store.clone()),
            Arc::clone(&clock),
            config.heat.clone(),
        );
        let escalation = EscalationTracker::new(Arc::new(store.clone()), Arc::clone(&clock));
        let budget = TokenBudget::new(config.budget.daily_token_limit, Arc::clone(&clock));

        let env = ToolEnv {
            store: store.clone(),
            escalation: escalation.clone(),
            notifier: Notifier::new(store.clone(), events.clone()),
            escalation_window_hours: config.engine.escalation_window_hours,
        };
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, &env);
        for def in self.extra_tools {
            registry.register(def);
        }
        registry.validate()?;
        info!(tools = registry.len(), "tool registry ready");

        let engine = Engine::new(EngineDeps {
            config: config.engine.clone(),
            llm,
            registry: Arc::new(registry),
            heat,
            escalation,
            budget: budget.clone(),
            tracer,
            store: store.clone(),
            supervisor: supervisor.clone(),
            clock: Arc::clone(&clock),
            events: events.clone(),
        });
        let scheduler = Scheduler::new(SchedulerDeps {
            engine: engine.clone(),
            store: store.clone(),
            budget,
            scheduler: config.scheduler.clone(),
            maintenance: config.maintenance.clone(),
            clock: Arc::clone(&clock),
            events: events.clone(),
            supervisor: supervisor.clone(),
        });
        let triggers = Triggers::new(scheduler.clone(), config.scheduler.cron_secret.as_deref());

        Ok(AgoraRuntime {
            config,
            store,
            events,
            clock,
            supervisor,
            engine,
            scheduler,
            triggers,
        })
    }
}

fn default_llm(config: &AgoraConfig) -> Arc<dyn LlmProvider> {
    let mut router = ModelRouter::new();
    match &config.services.openai_api_key {
        Some(key) if !key.is_empty() => {
            let mut provider = OpenAiProvider::new(key.clone())
                .with_timeout(Duration::from_secs(config.engine.llm_timeout_secs.max(1)));
            if let Some(url) = &config.services.openai_base_url {
                provider = provider.with_base_url(url.clone());
            }
            router.add_provider(Arc::new(provider));
        }
        _ => warn!("no OpenAI API key configured, model calls will fail"),
    }
    Arc::new(router)
}

fn tracer_from_config(config: &AgoraConfig, clock: Arc<dyn Clock>) -> Result<Tracer> {
    let tc = &config.tracing;
    if !tc.enabled {
        return Ok(Tracer::disabled(clock));
    }
    let Some(api_key) = tc.api_key.as_deref().filter(|k| !k.is_empty()) else {
        warn!("tracing enabled without an API key, run traces disabled");
        return Ok(Tracer::disabled(clock));
    };
    let sink = HttpTraceSink::new(
        &tc.endpoint,
        api_key,
        &tc.project,
        Duration::from_secs(tc.timeout_secs.max(1)),
    )?;
    info!(endpoint = %tc.endpoint, project = %tc.project, "shipping run traces");
    Ok(Tracer::new(Arc::new(sink), clock))
}
