//! Generation engines for palaver.
//!
//! One [`Engine`] trait (defined in `palaver-core`) with three backends:
//! a remote OpenAI-compatible completion server, an in-process Candle
//! model (behind the `local` feature), and a scripted rotation for dry
//! runs. [`build_from_config`] picks one at startup from `engine.kind`.

pub mod remote;
pub mod scripted;

#[cfg(feature = "local")]
pub mod local;

pub use remote::RemoteEngine;
pub use scripted::ScriptedEngine;

#[cfg(feature = "local")]
pub use local::LocalEngine;

use std::sync::Arc;

use palaver_config::AppConfig;
use palaver_core::Engine;
use tracing::info;

/// Build the engine selected by `engine.kind`.
///
/// Loading a local model downloads weights on first use, so call this
/// through `spawn_blocking` when a runtime is already up.
pub fn build_from_config(config: &AppConfig) -> palaver_core::Result<Arc<dyn Engine>> {
    match config.engine.kind.as_str() {
        "remote" => {
            info!(
                model = %config.engine.remote.model,
                base_url = %config.engine.remote.base_url,
                "Using remote completion engine"
            );
            let engine =
                RemoteEngine::from_config(&config.engine.remote, config.api_key.as_deref());
            Ok(Arc::new(engine))
        }
        "scripted" => {
            info!("Using scripted engine");
            Ok(Arc::new(ScriptedEngine::default()))
        }
        "local" => {
            #[cfg(feature = "local")]
            {
                info!(preset = %config.engine.local.preset, "Using local engine");
                let engine = LocalEngine::load(&config.engine.local)?;
                Ok(Arc::new(engine))
            }
            #[cfg(not(feature = "local"))]
            {
                Err(palaver_core::error::EngineError::NotConfigured(
                    "this build has no local engine; rebuild with --features local".into(),
                )
                .into())
            }
        }
        other => Err(palaver_core::Error::Config {
            message: format!("unknown engine kind \"{other}\""),
        }),
    }
}
