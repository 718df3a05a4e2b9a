//! `palaver discord` — run the bot against the Discord adapter.

use std::sync::Arc;

use palaver_channels::DiscordChannel;
use palaver_config::AppConfig;
use palaver_core::Channel;
use palaver_dialogue::Dispatcher;
use tracing::info;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let channel = Arc::new(DiscordChannel::from_config(&config.discord)?);

    let engine = super::build_engine(&config).await?;
    let responder = Arc::new(super::build_responder(&config, engine)?);
    let store = palaver_transcript::build_from_config(&config.transcript);

    let dyn_channel: Arc<dyn Channel> = channel.clone();
    let dispatcher = Arc::new(
        Dispatcher::new(dyn_channel, responder, store).with_behavior(config.behavior.clone()),
    );

    println!("  Palaver — Discord adapter (stub gateway)");
    println!("  No wire protocol yet; events can be injected in-process.");
    println!("  Press Ctrl+C to stop.");

    let run_handle = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    // Closing the channel ends the dispatch loop, which drains in-flight
    // replies and flushes open transcripts on its way out.
    channel.stop().await?;
    run_handle.await??;

    println!();
    println!("Stopped.");
    Ok(())
}
