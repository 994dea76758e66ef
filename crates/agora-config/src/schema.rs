use agora_core::WorkflowKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration: maps to `agora.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgoraConfig {
    pub engine: EngineConfig,
    pub heat: HeatConfig,
    pub budget: BudgetConfig,
    pub scheduler: SchedulerConfig,
    pub maintenance: MaintenanceConfig,
    pub store: StoreConfig,
    pub tracing: TracingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
}

// ── Engine ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model identifier, e.g. "openai/gpt-4o-mini".
    pub model: String,
    /// Maximum Observe→Reason→Act iterations per cycle.
    pub max_iterations: u32,
    /// Maximum tokens per model response.
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Timeout for a single model call.
    pub llm_timeout_secs: u64,
    /// Extra attempts after a failed model call (0 or 1).
    pub llm_retries: u32,
    /// Timeout for a single tool handler.
    pub tool_timeout_secs: u64,
    /// How many agents the agent cycle runs at once.
    pub max_concurrent_cycles: usize,
    /// Window used when counting a requester's repeated asks.
    pub escalation_window_hours: u32,
    /// Extra text appended to every actor's system prompt.
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".into(),
            max_iterations: 3,
            max_tokens: 1024,
            temperature: 0.8,
            llm_timeout_secs: 60,
            llm_retries: 1,
            tool_timeout_secs: 30,
            max_concurrent_cycles: 4,
            escalation_window_hours: 24,
            system_prompt: None,
        }
    }
}

// ── Heat ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatConfig {
    /// At or above this value an actor is blocked from throttled actions.
    pub block_threshold: u32,
    /// Hard ceiling for heat.
    pub max_heat: u32,
    /// Linear decay per elapsed minute.
    pub decay_per_minute: f64,
    /// Cost for action kinds not listed in `costs`.
    pub default_cost: u32,
    /// Per action kind cost, keyed by tool name.
    pub costs: HashMap<String, u32>,
}

impl Default for HeatConfig {
    fn default() -> Self {
        let costs = [
            ("like", 10),
            ("comment", 15),
            ("create_post", 25),
            ("follow", 10),
            ("join_community", 15),
            ("send_message", 5),
            ("reply", 5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            block_threshold: 80,
            max_heat: 100,
            decay_per_minute: 1.0,
            default_cost: 10,
            costs,
        }
    }
}

impl HeatConfig {
    pub fn cost_of(&self, action_kind: &str) -> u32 {
        self.costs
            .get(action_kind)
            .copied()
            .unwrap_or(self.default_cost)
    }
}

// ── Budget ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Tokens the whole world may spend per day. 0 = unlimited.
    pub daily_token_limit: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_token_limit: 2_000_000,
        }
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the timer loop at all.
    pub enabled: bool,
    /// How often the timer loop looks for due jobs.
    pub tick_secs: u64,
    /// Shared secret external cron callers must present.
    pub cron_secret: Option<String>,
    pub jobs: Vec<JobConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 5,
            cron_secret: None,
            jobs: vec![
                JobConfig::every("agent_cycle", 900),
                JobConfig::cron("relationship_decay", "0 0 3 * * *"),
                JobConfig::cron("memory_cleanup", "0 30 3 * * *"),
                JobConfig::cron("token_budget_reset", "0 0 0 * * *"),
            ],
        }
    }
}

/// One `[[scheduler.jobs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    Every { secs: u64 },
    Cron { expression: String },
}

impl JobConfig {
    pub fn every(key: impl Into<String>, secs: u64) -> Self {
        Self {
            key: key.into(),
            every_secs: Some(secs),
            cron: None,
            enabled: true,
        }
    }

    pub fn cron(key: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            every_secs: None,
            cron: Some(expression.into()),
            enabled: true,
        }
    }

    /// A cron expression wins over an interval when both are set.
    pub fn schedule(&self) -> Option<JobSchedule> {
        if let Some(expr) = &self.cron {
            return Some(JobSchedule::Cron {
                expression: expr.clone(),
            });
        }
        self.every_secs.map(|secs| JobSchedule::Every { secs })
    }
}

// ── Maintenance ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Fraction each relationship score moves toward 0 per decay run.
    pub relationship_decay_rate: f64,
    /// Memories older than this are candidates for cleanup.
    pub memory_retention_days: u32,
    /// Memories at or above this importance are kept forever.
    pub memory_min_importance: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            relationship_decay_rate: 0.05,
            memory_retention_days: 30,
            memory_min_importance: 0.5,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("agora.db"),
        }
    }
}

// ── Tracing sink ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Ship run trees to an external observability endpoint.
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub project: String,
    pub timeout_secs: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.smith.langchain.com".into(),
            api_key: None,
            project: "agora".into(),
            timeout_secs: 5,
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    /// Listen address for the trigger API.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:3710".into(),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// OpenAI-compatible API key. Falls back to `OPENAI_API_KEY`.
    pub openai_api_key: Option<String>,
    /// Override for OpenAI-compatible endpoints (OpenRouter, vLLM, ...).
    pub openai_base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl AgoraConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Engine ───
        if self.engine.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "engine.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'openai/gpt-4o-mini'".into()),
            });
        } else if !self.engine.model.contains('/') {
            warnings.push(ConfigWarning {
                field: "engine.model".into(),
                message: format!(
                    "model '{}' should be in 'provider/model' format",
                    self.engine.model
                ),
                severity: WarningSeverity::Warning,
                hint: Some("Use 'openai/gpt-4o-mini' or 'mock/echo'".into()),
            });
        }

        if self.engine.max_iterations == 0 {
            warnings.push(ConfigWarning {
                field: "engine.max_iterations".into(),
                message: "max_iterations is 0, no cycle could run".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 3".into()),
            });
        } else if self.engine.max_iterations > 20 {
            warnings.push(ConfigWarning {
                field: "engine.max_iterations".into(),
                message: format!(
                    "max_iterations {} is high, cycles may burn tokens",
                    self.engine.max_iterations
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        if self.engine.llm_retries > 1 {
            warnings.push(ConfigWarning {
                field: "engine.llm_retries".into(),
                message: format!(
                    "llm_retries {} is above 1, a failed model call is retried at most once",
                    self.engine.llm_retries
                ),
                severity: WarningSeverity::Error,
                hint: Some("Set to 0 or 1".into()),
            });
        }

        if self.engine.temperature < 0.0 || self.engine.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "engine.temperature".into(),
                message: format!("temperature {} is out of range", self.engine.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }

        if self.engine.max_concurrent_cycles == 0 {
            warnings.push(ConfigWarning {
                field: "engine.max_concurrent_cycles".into(),
                message: "max_concurrent_cycles is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to at least 1".into()),
            });
        }

        // ── Heat ───
        if self.heat.max_heat == 0 || self.heat.max_heat > 100 {
            warnings.push(ConfigWarning {
                field: "heat.max_heat".into(),
                message: format!("max_heat {} must be in 1..=100", self.heat.max_heat),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.heat.block_threshold > self.heat.max_heat {
            warnings.push(ConfigWarning {
                field: "heat.block_threshold".into(),
                message: format!(
                    "block_threshold {} is above max_heat {}",
                    self.heat.block_threshold, self.heat.max_heat
                ),
                severity: WarningSeverity::Error,
                hint: Some("Actors would never be blocked".into()),
            });
        }
        if self.heat.decay_per_minute <= 0.0 {
            warnings.push(ConfigWarning {
                field: "heat.decay_per_minute".into(),
                message: "decay rate must be positive".into(),
                severity: WarningSeverity::Error,
                hint: Some("Blocked actors would stay blocked forever".into()),
            });
        }

        // ── Budget ───
        if self.budget.daily_token_limit == 0 {
            warnings.push(ConfigWarning {
                field: "budget.daily_token_limit".into(),
                message: "no daily token limit, spend is unbounded".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Scheduler ───
        for (i, job) in self.scheduler.jobs.iter().enumerate() {
            let field = format!("scheduler.jobs[{}]", i);
            let Some(key) = WorkflowKey::parse(&job.key) else {
                warnings.push(ConfigWarning {
                    field,
                    message: format!("unknown job key '{}'", job.key),
                    severity: WarningSeverity::Error,
                    hint: Some(format!(
                        "Known keys: {}",
                        WorkflowKey::ALL.map(|k| k.as_str()).join(", ")
                    )),
                });
                continue;
            };
            if key.is_event_driven() {
                warnings.push(ConfigWarning {
                    field,
                    message: format!("'{}' is event-driven and cannot be scheduled", key),
                    severity: WarningSeverity::Error,
                    hint: Some("Remove this entry; chat runs are triggered by requests".into()),
                });
                continue;
            }
            match job.schedule() {
                None => warnings.push(ConfigWarning {
                    field,
                    message: format!("job '{}' has neither every_secs nor cron", key),
                    severity: WarningSeverity::Error,
                    hint: None,
                }),
                Some(JobSchedule::Every { secs: 0 }) => warnings.push(ConfigWarning {
                    field,
                    message: format!("job '{}' has every_secs = 0", key),
                    severity: WarningSeverity::Error,
                    hint: None,
                }),
                Some(JobSchedule::Cron { expression }) => {
                    if let Err(e) = cron::Schedule::from_str(&expression) {
                        warnings.push(ConfigWarning {
                            field,
                            message: format!("invalid cron expression '{}': {}", expression, e),
                            severity: WarningSeverity::Error,
                            hint: Some("Six fields, seconds first: '0 0 3 * * *'".into()),
                        });
                    }
                }
                Some(JobSchedule::Every { .. }) => {}
            }
        }

        if self.scheduler.cron_secret.is_none() {
            warnings.push(ConfigWarning {
                field: "scheduler.cron_secret".into(),
                message: "no cron secret set, external workflow triggers are disabled".into(),
                severity: WarningSeverity::Info,
                hint: Some("Set AGORA_CRON_SECRET to enable POST /api/v1/workflows/{key}/run".into()),
            });
        }

        // ── Maintenance ───
        let rate = self.maintenance.relationship_decay_rate;
        if !(0.0..=1.0).contains(&rate) {
            warnings.push(ConfigWarning {
                field: "maintenance.relationship_decay_rate".into(),
                message: format!("decay rate {} must be between 0.0 and 1.0", rate),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Tracing ───
        if self.tracing.enabled && self.tracing.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "tracing.api_key".into(),
                message: "tracing is enabled but no api key is set".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set AGORA_TRACING_API_KEY".into()),
            });
        }

        // ── Server ───
        if self.server.enabled && self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '127.0.0.1:3710'".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
