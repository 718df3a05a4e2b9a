//! The event loop: one dispatcher per channel, one buffer per chat.
//!
//! The dispatcher pulls inbound events off the channel, routes commands,
//! appends conversation turns, and decides when the bot should speak.
//! Generation runs in spawned tasks so a slow reply in one chat never
//! stalls the others; a per-exchange lock keeps replies within a chat
//! sequential.

use std::collections::HashMap;
use std::sync::Arc;

use palaver_config::BehaviorConfig;
use palaver_core::{Channel, ChannelEvent, ExchangeId, TranscriptStore, Turn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::buffer::ConversationBuffer;
use crate::command::{parse_command, usage, ParsedCommand};
use crate::responder::{Responder, ResponseOutcome, SharedBuffer};

#[derive(Clone)]
struct Exchange {
    buffer: SharedBuffer,
    /// Serializes generation per exchange. Events keep flowing while a
    /// reply is in flight; only further replies wait.
    generation: Arc<Mutex<()>>,
}

pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    responder: Arc<Responder>,
    store: Arc<dyn TranscriptStore>,
    behavior: BehaviorConfig,
    exchanges: Mutex<HashMap<String, Exchange>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn Channel>,
        responder: Arc<Responder>,
        store: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            channel,
            responder,
            store,
            behavior: BehaviorConfig::default(),
            exchanges: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: BehaviorConfig) -> Self {
        self.behavior = behavior;
        self
    }

    /// Runs until the channel's event stream closes, then drains in-flight
    /// replies and flushes every open transcript.
    pub async fn run(&self) -> palaver_core::Result<()> {
        let mut events = self.channel.start().await?;
        info!(channel = self.channel.name(), "Dispatcher running");

        while let Some(event) = events.recv().await {
            match event {
                Ok(event) => self.handle_event(event).await,
                Err(e) => warn!(error = %e, "Channel produced a broken event"),
            }
        }

        info!("Event stream closed, draining in-flight replies");
        for handle in self.tasks.lock().await.drain(..) {
            let _ = handle.await;
        }
        self.flush().await;
        Ok(())
    }

    async fn handle_event(&self, event: ChannelEvent) {
        let exchange = self.exchange_for(&event.chat_id).await;

        if let Some(parsed) = parse_command(self.responder.speaker(), &event.text) {
            self.run_command(&event, &exchange, parsed).await;
            return;
        }

        let respond = {
            let mut buffer = exchange.buffer.lock().await;
            buffer.append(Turn::new(event.speaker(), event.text.clone()));
            self.should_respond(&event, &buffer)
        };
        if !respond {
            return;
        }

        let burst = sample_burst(self.behavior.reply_rate, self.behavior.max_burst);
        debug!(chat = %event.chat_id, burst, "Responding");

        let channel = self.channel.clone();
        let responder = self.responder.clone();
        let chat_id = event.chat_id.clone();
        let task = tokio::spawn(async move {
            let _running = exchange.generation.lock().await;
            for _ in 0..burst {
                let _ = channel.send_typing(&chat_id).await;
                match responder.respond(&exchange.buffer).await {
                    Ok(ResponseOutcome::Reply(turn)) => {
                        if let Err(e) = channel.send(&chat_id, &turn.text).await {
                            warn!(chat = %chat_id, error = %e, "Failed to deliver reply");
                        }
                    }
                    Ok(_) => {} // deliberate silence
                    Err(e) => {
                        error!(chat = %chat_id, error = %e, "Generation failed");
                        let _ = channel
                            .send_structured(
                                &chat_id,
                                "Error",
                                "Internal error, better luck next message",
                                None,
                            )
                            .await;
                        break;
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(task);
    }

    /// Whether an ordinary message warrants a reply: always in direct
    /// chats and on explicit mentions, on any plain-text use of the bot's
    /// name, and sometimes when the message right after the bot's own turn
    /// reads like it is addressed to the bot.
    fn should_respond(&self, event: &ChannelEvent, buffer: &ConversationBuffer) -> bool {
        if event.is_direct || event.mentions_self {
            return true;
        }
        let content = event.text.to_lowercase();
        if content.contains(&self.responder.speaker().to_lowercase()) {
            return true;
        }
        let log = buffer.full_log();
        if log.len() >= 2 && log[log.len() - 2].is_by(self.responder.speaker()) {
            if content.contains("you") || content.contains("we") {
                return true;
            }
            use rand::Rng;
            return rand::rng().random::<f64>() < self.behavior.followup_chance;
        }
        false
    }

    async fn run_command(&self, event: &ChannelEvent, exchange: &Exchange, parsed: ParsedCommand) {
        let name = self.responder.speaker();
        let request = match parsed {
            ParsedCommand::ShowHelp => {
                let _ = self
                    .channel
                    .send_structured(&event.chat_id, "Help", &usage(name), None)
                    .await;
                return;
            }
            ParsedCommand::Run(request) => request,
        };
        info!(chat = %event.chat_id, ?request, "Running command");

        let mut replies: Vec<(String, String, Option<String>)> = Vec::new();
        {
            let mut buffer = exchange.buffer.lock().await;

            if request.reset {
                buffer.persist_and_reset(self.store.as_ref()).await;
                replies.push((
                    "Reset".to_string(),
                    "Conversation history has been reset.".to_string(),
                    None,
                ));
            }

            let mut gaslit = false;
            if let Some(replacement) = &request.gaslight {
                let found = buffer.find_last(name).map(|(index, _)| index);
                match found {
                    Some(index) => {
                        buffer.amend(index, Turn::new(name, replacement.clone()));
                        gaslit = true;
                    }
                    None => replies.push((
                        "Gaslight".to_string(),
                        "No prior message to rewrite.".to_string(),
                        None,
                    )),
                }
            }

            if gaslit || request.history {
                let title = if gaslit { "Gaslit History" } else { "History" };
                let body = self
                    .responder
                    .formatter()
                    .render_transcript(buffer.full_log());
                let body = if body.is_empty() {
                    "(nothing yet)".to_string()
                } else {
                    body
                };
                let footer = format!(
                    "The model can only remember approximately the last {} tokens.",
                    self.responder.context_window()
                );
                replies.push((title.to_string(), body, Some(footer)));
            }
        }

        for (title, body, footer) in replies {
            let _ = self
                .channel
                .send_structured(&event.chat_id, &title, &body, footer.as_deref())
                .await;
        }
    }

    async fn exchange_for(&self, chat_id: &str) -> Exchange {
        let mut exchanges = self.exchanges.lock().await;
        exchanges
            .entry(chat_id.to_string())
            .or_insert_with(|| {
                let id = ExchangeId::scoped(self.channel.name(), chat_id);
                info!(exchange = %id, "New exchange");
                Exchange {
                    buffer: Arc::new(Mutex::new(ConversationBuffer::new(id))),
                    generation: Arc::new(Mutex::new(())),
                }
            })
            .clone()
    }

    /// Persists every non-empty log without resetting. Called on shutdown;
    /// failures are logged per exchange and do not stop the sweep.
    pub async fn flush(&self) {
        let exchanges: Vec<Exchange> = self.exchanges.lock().await.values().cloned().collect();
        for exchange in exchanges {
            let buffer = exchange.buffer.lock().await;
            if buffer.full_log().is_empty() {
                continue;
            }
            if let Err(e) = self
                .store
                .persist(buffer.exchange_id(), buffer.full_log())
                .await
            {
                warn!(exchange = %buffer.exchange_id(), error = %e, "Failed to flush transcript");
            }
        }
    }
}

/// How many replies one trigger earns: 1 + Poisson(rate), capped. Knuth's
/// product-of-uniforms sampler.
fn sample_burst(rate: f64, max_burst: usize) -> usize {
    let cap = max_burst.max(1);
    if rate <= 0.0 {
        return 1;
    }
    use rand::Rng;
    let threshold = (-rate).exp();
    let mut rng = rand::rng();
    let mut extra = 0;
    let mut p: f64 = rng.random();
    while p > threshold && 1 + extra < cap {
        extra += 1;
        p *= rng.random::<f64>();
    }
    (1 + extra).min(cap)
}
