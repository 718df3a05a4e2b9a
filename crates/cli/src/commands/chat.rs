//! `palaver chat` — interactive console session, or a single message
//! with `--message`.

use std::sync::Arc;

use palaver_channels::ConsoleChannel;
use palaver_config::AppConfig;
use palaver_core::{Channel, ExchangeId, Turn};
use palaver_dialogue::{command_prefix, ConversationBuffer, Dispatcher, ResponseOutcome, SharedBuffer};
use tokio::sync::Mutex;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let engine = super::build_engine(&config).await?;
    let responder = Arc::new(super::build_responder(&config, engine.clone())?);

    if let Some(text) = message {
        // Single-message mode: one turn in, one reply out, no transcript.
        let buffer: SharedBuffer = Arc::new(Mutex::new(ConversationBuffer::new(
            ExchangeId::scoped("console", "oneshot"),
        )));
        buffer.lock().await.append(Turn::new("User", text));

        match responder.respond(&buffer).await? {
            ResponseOutcome::Reply(turn) => println!("{}", turn.text),
            ResponseOutcome::Empty => eprintln!("(the bot had nothing to say)"),
            ResponseOutcome::Filtered => eprintln!("(reply withheld by the safety filter)"),
            ResponseOutcome::Discarded => {}
        }
        return Ok(());
    }

    println!();
    println!("  Palaver — console chat");
    println!(
        "  Engine:   {} (context {} tokens)",
        engine.name(),
        engine.max_context()
    );
    println!("  Persona:  {}", config.persona.name);
    println!(
        "  Commands: {} -r | -g WORD [WORD ...] | -t",
        command_prefix(&config.persona.name)
    );
    println!("  Type a message and press Enter; 'exit' or Ctrl+D to leave.");
    println!();

    if !matches!(engine.health_check().await, Ok(true)) {
        eprintln!("  Warning: the engine failed its health check; replies may not arrive.");
        eprintln!();
    }

    let channel: Arc<dyn Channel> = Arc::new(ConsoleChannel::new(&config.persona.name));
    let store = palaver_transcript::build_from_config(&config.transcript);
    let dispatcher = Dispatcher::new(channel, responder, store).with_behavior(config.behavior.clone());

    dispatcher.run().await?;

    println!();
    println!("Bye.");
    Ok(())
}
