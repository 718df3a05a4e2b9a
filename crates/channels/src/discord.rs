//! Discord channel adapter (stub).
//!
//! Implements the Channel trait for Discord. In production this would run
//! a gateway WebSocket session; currently a stub with in-process event
//! injection so the rest of the pipeline can be driven end to end.

use async_trait::async_trait;
use palaver_config::DiscordSection;
use palaver_core::error::ChannelError;
use palaver_core::{Channel, ChannelEvent, ChannelId};
use tokio::sync::mpsc;
use tracing::info;

/// Discord adapter configuration.
#[derive(Clone)]
pub struct DiscordConfig {
    /// Bot token from the Discord developer portal.
    pub bot_token: String,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

/// Discord channel adapter.
pub struct DiscordChannel {
    config: DiscordConfig,
    channel_id: ChannelId,
    inject_tx: tokio::sync::Mutex<Option<mpsc::Sender<Result<ChannelEvent, ChannelError>>>>,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            channel_id: ChannelId("discord".into()),
            inject_tx: tokio::sync::Mutex::new(None),
        }
    }

    /// Build from the config section, requiring a token.
    pub fn from_config(section: &DiscordSection) -> Result<Self, ChannelError> {
        let bot_token = section.bot_token.clone().ok_or_else(|| {
            ChannelError::NotConfigured(
                "No Discord bot token; set PALAVER_DISCORD_TOKEN or discord.bot_token".into(),
            )
        })?;
        Ok(Self::new(DiscordConfig { bot_token }))
    }

    /// Inject an event as if it came from the Discord gateway (for testing).
    pub async fn inject_event(&self, event: ChannelEvent) -> Result<(), ChannelError> {
        let guard = self.inject_tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            tx.send(Ok(event))
                .await
                .map_err(|_| ChannelError::ConnectionLost("Event channel closed".into()))
        } else {
            Err(ChannelError::ConnectionLost("Channel not started".into()))
        }
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> std::result::Result<
        mpsc::Receiver<std::result::Result<ChannelEvent, ChannelError>>,
        ChannelError,
    > {
        info!("Discord channel starting (stub mode)");
        let (tx, rx) = mpsc::channel(64);
        *self.inject_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, text: &str) -> std::result::Result<(), ChannelError> {
        info!(
            chat_id = %chat_id,
            text_len = text.len(),
            "Discord send (stub)"
        );
        Ok(())
    }

    async fn send_structured(
        &self,
        chat_id: &str,
        title: &str,
        body: &str,
        footer: Option<&str>,
    ) -> std::result::Result<(), ChannelError> {
        // A real gateway session would send an embed here
        info!(
            chat_id = %chat_id,
            title = %title,
            body_len = body.len(),
            footer = ?footer,
            "Discord embed (stub)"
        );
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> std::result::Result<(), ChannelError> {
        info!(chat_id = %chat_id, "Discord typing (stub)");
        Ok(())
    }

    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        info!("Discord channel stopping");
        *self.inject_tx.lock().await = None;
        Ok(())
    }

    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(!self.config.bot_token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_config() -> DiscordConfig {
        DiscordConfig {
            bot_token: "test-discord-token".into(),
        }
    }

    #[test]
    fn channel_name_and_id() {
        let ch = DiscordChannel::new(test_config());
        assert_eq!(ch.name(), "discord");
        assert_eq!(ch.id().0, "discord");
    }

    #[test]
    fn debug_redacts_the_token() {
        let debug = format!("{:?}", test_config());
        assert!(!debug.contains("test-discord-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn from_config_requires_a_token() {
        let section = DiscordSection::default();
        assert!(DiscordChannel::from_config(&section).is_err());

        let section = DiscordSection {
            bot_token: Some("tok".into()),
        };
        assert!(DiscordChannel::from_config(&section).is_ok());
    }

    #[tokio::test]
    async fn start_inject_and_receive() {
        let ch = DiscordChannel::new(test_config());
        let mut rx = ch.start().await.unwrap();

        let event = ChannelEvent {
            chat_id: "guild#general".into(),
            sender_id: "user456".into(),
            sender_name: Some("Bob".into()),
            text: "Hey from Discord!".into(),
            timestamp: Utc::now(),
            is_direct: false,
            mentions_self: true,
            metadata: serde_json::Map::new(),
        };

        ch.inject_event(event).await.unwrap();
        let received = rx.recv().await.unwrap().unwrap();
        assert_eq!(received.text, "Hey from Discord!");
        assert!(received.mentions_self);
    }

    #[tokio::test]
    async fn inject_before_start_fails() {
        let ch = DiscordChannel::new(test_config());
        let event = ChannelEvent {
            chat_id: "c".into(),
            sender_id: "u".into(),
            sender_name: None,
            text: "early".into(),
            timestamp: Utc::now(),
            is_direct: false,
            mentions_self: false,
            metadata: serde_json::Map::new(),
        };
        assert!(ch.inject_event(event).await.is_err());
    }

    #[tokio::test]
    async fn send_and_health() {
        let ch = DiscordChannel::new(test_config());
        assert!(ch.send("channel1", "Hello!").await.is_ok());
        assert!(ch.health_check().await.unwrap());

        let empty = DiscordChannel::new(DiscordConfig {
            bot_token: String::new(),
        });
        assert!(!empty.health_check().await.unwrap());
    }
}
