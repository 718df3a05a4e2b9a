//! `palaver status` — show the effective configuration and whether the
//! configured engine is reachable.

use palaver_config::AppConfig;
use palaver_safety::ContentFilter;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🗣️  Palaver Status");
    println!("================");
    println!();
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Persona:       {}", config.persona.name);
    println!("  Engine:        {}", config.engine.kind);
    match config.engine.kind.as_str() {
        "remote" => {
            println!("  Server:        {}", config.engine.remote.base_url);
            println!("  Model:         {}", config.engine.remote.model);
            println!(
                "  Context:       {} tokens",
                config.engine.remote.context_length
            );
            println!(
                "  API key:       {}",
                if config.has_api_key() {
                    "configured"
                } else {
                    "not set"
                }
            );
        }
        "local" => {
            println!("  Preset:        {}", config.engine.local.preset);
        }
        _ => {}
    }

    let sampling = config.sampling.resolve()?;
    println!(
        "  Sampling:      temperature {}, up to {} tokens per reply",
        sampling.temperature, sampling.max_tokens
    );

    if config.safety.enabled {
        match ContentFilter::load(config.safety.extra_wordlist.as_deref()) {
            Ok(filter) => println!("  Safety filter: {} blocked terms", filter.term_count()),
            Err(e) => println!("  Safety filter: ⚠️  failed to load ({e})"),
        }
    } else {
        println!("  Safety filter: disabled");
    }

    println!(
        "  Transcripts:   {} ({})",
        config.transcript.store,
        config.transcript.dir.display()
    );
    println!(
        "  Behavior:      follow-up chance {}, burst cap {}",
        config.behavior.followup_chance, config.behavior.max_burst
    );
    println!();

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("✅ Config file found");
    } else {
        println!("⚠️  No config file — run `palaver onboard` to create one");
    }

    // Probe the engine unless it's a local model; loading gigabytes of
    // weights just to report status is not worth it.
    if config.engine.kind != "local" {
        let engine = super::build_engine(&config).await?;
        match engine.health_check().await {
            Ok(true) => println!("✅ Engine reachable"),
            Ok(false) => println!("⚠️  Engine did not answer its health check"),
            Err(e) => println!("⚠️  Engine health check failed: {e}"),
        }
    }

    println!();
    Ok(())
}
