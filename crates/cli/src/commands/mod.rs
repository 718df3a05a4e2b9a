//! Subcommand implementations, plus the wiring shared between them.

pub mod chat;
pub mod discord;
pub mod onboard;
pub mod status;

use std::sync::Arc;

use palaver_config::AppConfig;
use palaver_core::Engine;
use palaver_dialogue::{PromptFormatter, Responder};
use palaver_safety::ContentFilter;

/// Build the configured engine off the async runtime; loading a local
/// model blocks for as long as the download takes.
pub(crate) async fn build_engine(
    config: &AppConfig,
) -> Result<Arc<dyn Engine>, Box<dyn std::error::Error>> {
    let config = config.clone();
    let engine = tokio::task::spawn_blocking(move || palaver_engines::build_from_config(&config))
        .await
        .map_err(|e| format!("Engine setup task failed: {e}"))??;
    Ok(engine)
}

/// Assemble the responder: persona, sampling knobs, safety filter.
pub(crate) fn build_responder(
    config: &AppConfig,
    engine: Arc<dyn Engine>,
) -> Result<Responder, Box<dyn std::error::Error>> {
    let sampling = config.sampling.resolve()?;

    let filter = if config.safety.enabled {
        ContentFilter::load(config.safety.extra_wordlist.as_deref())?
    } else {
        ContentFilter::empty()
    };

    let formatter = PromptFormatter::new(&config.persona.preamble, &config.persona.name);

    Ok(Responder::new(engine, formatter)
        .with_sampling(sampling)
        .with_filter(filter)
        .with_concurrency(config.engine.max_concurrent))
}
