//! Palaver CLI — the main entry point.
//!
//! Subcommands:
//! - `onboard` — create the config directory and a starter config.toml
//! - `chat`    — talk to the bot in the terminal
//! - `discord` — run the Discord adapter
//! - `status`  — show configuration and engine reachability

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "palaver",
    about = "Palaver — a chatroom bot that talks like a regular",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Chat with the bot in the terminal
    Chat {
        /// Send a single message and print the reply instead of opening
        /// an interactive session
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Run the Discord adapter
    Discord,

    /// Show configuration and engine health
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Discord => commands::discord::run().await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
