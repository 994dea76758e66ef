use agora_config::AgoraConfig;
use agora_runtime::AgoraRuntime;

pub(super) async fn cmd_chat(
    config: AgoraConfig,
    agent: String,
    from: String,
    text: String,
) -> agora_core::Result<()> {
    let runtime = AgoraRuntime::from_config(config)?;
    let resp = runtime.triggers.receive_message(&from, &agent, &text).await?;

    if resp.executed_actions.is_empty() {
        println!("{agent} did nothing ({})", resp.message);
    } else {
        println!("{agent}: {}", resp.executed_actions.join(", "));
    }
    println!("   {} iteration(s) in {}ms", resp.iterations, resp.elapsed_ms);
    for err in &resp.errors {
        println!("   ! {err}");
    }

    runtime.drain(super::DRAIN_TIMEOUT).await;
    Ok(())
}
