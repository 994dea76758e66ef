use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use agora_config::AgoraConfig;
use agora_core::WorldEvent;
use agora_runtime::AgoraRuntime;

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

pub(super) async fn cmd_start(config: AgoraConfig, no_server: bool) -> agora_core::Result<()> {
    println!("Agora v{}", env!("CARGO_PKG_VERSION"));
    println!("   Model: {}", config.engine.model);
    println!("   Store: {}", config.store.db_path.display());
    if config.services.openai_api_key.is_none() {
        eprintln!("   No LLM API key found. Agents won't be able to think.");
        eprintln!("   In agora.toml:  [services]");
        eprintln!("                   openai_api_key = \"sk-...\"");
        eprintln!("   Or env var:     export OPENAI_API_KEY=sk-...");
    }

    let runtime = AgoraRuntime::from_config(config)?;
    let shutdown = CancellationToken::new();

    let server = if !no_server && runtime.config.server.enabled {
        println!("   HTTP: http://{}", runtime.config.server.listen);
        let rt = runtime.clone();
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            agora_server::start_server(rt, token).await
        }))
    } else {
        None
    };

    if runtime.config.scheduler.enabled {
        println!(
            "   Scheduler: {} job(s), tick {}s",
            runtime.scheduler.job_states().len(),
            runtime.config.scheduler.tick_secs
        );
    } else {
        println!("   Scheduler: disabled (HTTP triggers only)");
    }
    println!();

    let scheduler = {
        let sched = runtime.scheduler.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { sched.run(token).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    runtime.events.publish(WorldEvent::Shutdown);
    shutdown.cancel();

    if let Err(e) = scheduler.await {
        error!(error = %e, "scheduler task failed");
    }
    if let Some(server) = server {
        match server.await {
            Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
            Err(e) => error!(error = %e, "HTTP server task failed"),
            Ok(Ok(())) => {}
        }
    }

    if !runtime.drain(SHUTDOWN_DRAIN).await {
        warn!(
            in_flight = runtime.supervisor.in_flight(),
            "background tasks still running at shutdown"
        );
    }
    println!("Goodbye.");
    Ok(())
}
