//! Channel trait — the abstraction over chat platforms.
//!
//! A Channel connects the bot to a messaging platform (Discord, terminal,
//! etc.). It delivers inbound events from participants and carries replies
//! back out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound event delivered by a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// The chat/group/DM identifier within the channel; one exchange each
    pub chat_id: String,

    /// Sender identifier (platform-specific user ID)
    pub sender_id: String,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// The text content
    pub text: String,

    /// When the platform saw the message
    pub timestamp: DateTime<Utc>,

    /// Whether the chat is a private/direct context, where every message
    /// expects a reply
    #[serde(default)]
    pub is_direct: bool,

    /// Whether the bot was explicitly mentioned (platform mention, not a
    /// plain-text name match)
    #[serde(default)]
    pub mentions_self: bool,

    /// Platform-specific metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ChannelEvent {
    /// The best display name available for the sender.
    pub fn speaker(&self) -> &str {
        self.sender_name.as_deref().unwrap_or(&self.sender_id)
    }
}

/// The core Channel trait.
///
/// Implementations handle platform-specific connection logic, message
/// formatting, and rate limiting.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "discord", "cli").
    fn name(&self) -> &str;

    /// Unique ID for this channel instance.
    fn id(&self) -> &ChannelId;

    /// Start listening for incoming events.
    ///
    /// Returns a receiver that yields inbound events. The channel
    /// implementation handles polling, gateways, or stdin internally.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChannelEvent, ChannelError>>,
        ChannelError,
    >;

    /// Send a plain text reply to a specific chat.
    async fn send(&self, chat_id: &str, text: &str) -> std::result::Result<(), ChannelError>;

    /// Send a structured status/help/history reply.
    ///
    /// Platforms with rich output (embeds, cards) override this; the default
    /// flattens into plain text.
    async fn send_structured(
        &self,
        chat_id: &str,
        title: &str,
        body: &str,
        footer: Option<&str>,
    ) -> std::result::Result<(), ChannelError> {
        let mut text = format!("** {title} **\n{body}");
        if let Some(footer) = footer {
            text.push('\n');
            text.push_str(footer);
        }
        self.send(chat_id, &text).await
    }

    /// Show a typing indicator (if the platform supports it).
    async fn send_typing(&self, _chat_id: &str) -> std::result::Result<(), ChannelError> {
        Ok(()) // No-op default
    }

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check — is the channel connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_event_creation() {
        let event = ChannelEvent {
            chat_id: "67890".into(),
            sender_id: "12345".into(),
            sender_name: Some("Alice".into()),
            text: "Hello bot!".into(),
            timestamp: Utc::now(),
            is_direct: false,
            mentions_self: false,
            metadata: serde_json::Map::new(),
        };
        assert_eq!(event.text, "Hello bot!");
        assert_eq!(event.speaker(), "Alice");
    }

    #[test]
    fn speaker_falls_back_to_sender_id() {
        let event = ChannelEvent {
            chat_id: "67890".into(),
            sender_id: "12345".into(),
            sender_name: None,
            text: "hi".into(),
            timestamp: Utc::now(),
            is_direct: true,
            mentions_self: false,
            metadata: serde_json::Map::new(),
        };
        assert_eq!(event.speaker(), "12345");
    }
}
