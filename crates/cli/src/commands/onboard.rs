//! First-time setup: seed the config directory and a starter config.

use palaver_config::{AppConfig, TranscriptConfig};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🗣️  Palaver — First-Time Setup");
    println!("=============================");
    println!();

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("   Config directory exists: {}", config_dir.display());
    }

    let transcripts_dir = TranscriptConfig::default().dir;
    if !transcripts_dir.exists() {
        std::fs::create_dir_all(&transcripts_dir)?;
        println!("✅ Created transcript directory: {}", transcripts_dir.display());
    }

    if config_path.exists() {
        println!();
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it in place, or delete it and re-run onboard.");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Point engine.remote.base_url at a llama.cpp-style completion server");
        println!("      (or set engine.kind = \"scripted\" for a dry run with canned replies)");
        println!("   2. Give the bot a name and a preamble under [persona]");
        println!("   3. For Discord, set PALAVER_DISCORD_TOKEN in the environment");
    }

    println!();
    println!("🎉 Setup complete! Run `palaver chat` to start talking.");
    println!();

    Ok(())
}
