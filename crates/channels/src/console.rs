//! Console channel — interactive terminal chat.
//!
//! The simplest channel: reads lines from stdin, prints replies to stdout.
//! Used by `palaver chat`.

use async_trait::async_trait;
use chrono::Utc;
use palaver_core::error::ChannelError;
use palaver_core::{Channel, ChannelEvent, ChannelId};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Interactive console channel for terminal chat.
pub struct ConsoleChannel {
    id: ChannelId,
    bot_name: String,
}

impl ConsoleChannel {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            id: ChannelId("console".into()),
            bot_name: bot_name.into(),
        }
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> std::result::Result<
        mpsc::Receiver<std::result::Result<ChannelEvent, ChannelError>>,
        ChannelError,
    > {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        // Exit commands end the session
                        if matches!(line.as_str(), "exit" | "quit" | "/exit" | "/quit" | ":q") {
                            break;
                        }

                        let event = ChannelEvent {
                            chat_id: "console".into(),
                            sender_id: "local_user".into(),
                            sender_name: Some("User".into()),
                            text: line,
                            timestamp: Utc::now(),
                            is_direct: true,
                            mentions_self: false,
                            metadata: serde_json::Map::new(),
                        };

                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChannelError::ConnectionLost(e.to_string())))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _chat_id: &str, text: &str) -> std::result::Result<(), ChannelError> {
        println!("{}: {text}", self.bot_name);
        Ok(())
    }

    async fn send_structured(
        &self,
        _chat_id: &str,
        title: &str,
        body: &str,
        footer: Option<&str>,
    ) -> std::result::Result<(), ChannelError> {
        println!("-- {title} --");
        print!("{body}");
        if !body.ends_with('\n') {
            println!();
        }
        if let Some(footer) = footer {
            println!("{footer}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_channel_properties() {
        let ch = ConsoleChannel::new("Palaver");
        assert_eq!(ch.name(), "console");
        assert_eq!(ch.id().0, "console");
    }
}
