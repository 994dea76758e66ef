use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use agora_config::{AgoraConfig, ConfigLoader};
use agora_core::AgoraError;
use agora_runtime::{AgoraRuntime, RunContext, WorkflowRunResult};
use agora_store::{RunStatus, SqliteStore};

mod chat;
mod start;

/// How long one-shot commands wait for detached mention cycles.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Agora: a decision engine for LLM-driven actors
#[derive(Parser)]
#[command(name = "agora", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to agora.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and the HTTP trigger server
    Start {
        /// Don't start the HTTP server
        #[arg(long)]
        no_server: bool,
    },
    /// Run one workflow now (agent_cycle, relationship_decay, memory_cleanup, token_budget_reset)
    Run {
        /// Workflow key
        key: String,
    },
    /// Deliver a private message to an agent and run its chat workflow
    Chat {
        /// Agent receiving the message
        #[arg(long)]
        agent: String,
        /// Actor sending the message
        #[arg(long)]
        from: String,
        /// Message text
        text: String,
    },
    /// Show recent workflow runs
    Runs {
        /// Number of runs to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> agora_core::Result<()> {
        let config = ConfigLoader::load(self.config.as_deref())?.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };
        init_logging(log_level, &config.logging.format);

        match self.command {
            Commands::Start { no_server } => start::cmd_start(config, no_server).await,
            Commands::Run { key } => Self::cmd_run(config, key).await,
            Commands::Chat { agent, from, text } => {
                chat::cmd_chat(config, agent, from, text).await
            }
            Commands::Runs { limit, json } => Self::cmd_runs(config, limit, json),
            Commands::Config { json } => Self::cmd_config(config, json),
        }
    }

    async fn cmd_run(config: AgoraConfig, key: String) -> agora_core::Result<()> {
        let runtime = AgoraRuntime::from_config(config)?;
        let result = runtime
            .scheduler
            .run_named(&key, RunContext::manual())
            .await?;
        runtime.drain(DRAIN_TIMEOUT).await;

        print_result(&result);
        if result.status == RunStatus::Error {
            return Err(AgoraError::Engine(format!("workflow {key} failed")));
        }
        Ok(())
    }

    fn cmd_runs(config: AgoraConfig, limit: usize, json: bool) -> agora_core::Result<()> {
        let store = SqliteStore::open(&config.store.db_path)?;
        let runs = store.recent_runs(limit)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&runs)?);
            return Ok(());
        }
        if runs.is_empty() {
            println!("No workflow runs recorded.");
            return Ok(());
        }
        for run in runs {
            println!(
                "{}  {:<20} {:<8} {:<7} {}",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.workflow_key,
                run.status,
                run.trigger,
                run.message
            );
            if let Some(err) = run.error {
                println!("      error: {err}");
            }
        }
        Ok(())
    }

    fn cmd_config(config: AgoraConfig, json: bool) -> agora_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| AgoraError::Config(e.to_string()))?
            );
        }
        Ok(())
    }
}

fn init_logging(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

fn print_result(result: &WorkflowRunResult) {
    println!("{}: {} ({})", result.key, result.status, result.message);
    for cycle in &result.cycles {
        let actions = if cycle.executed_actions.is_empty() {
            "nothing".to_string()
        } else {
            cycle.executed_actions.join(", ")
        };
        println!(
            "   {}: {} in {} iteration(s), {} tokens",
            cycle.actor_id, actions, cycle.iterations, cycle.tokens_used
        );
        for err in &cycle.errors {
            println!("      ! {err}");
        }
    }
    if let Some(err) = &result.error {
        println!("   error: {err}");
    }
}
