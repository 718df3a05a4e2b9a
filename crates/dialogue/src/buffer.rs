//! Conversation history for a single exchange.
//!
//! A buffer keeps every turn since the last reset plus a sliding window of
//! the turns still eligible for prompting. Eviction only moves the window
//! start forward, so transcripts and retroactive edits keep seeing turns
//! the prompt no longer does.

use palaver_core::{ExchangeId, TranscriptStore, Turn};
use tracing::{debug, warn};
use uuid::Uuid;

/// Full log and active window for one conversation.
///
/// One buffer exists per exchange. Callers serialize generation per buffer;
/// the buffer itself only guards its own bookkeeping.
#[derive(Debug)]
pub struct ConversationBuffer {
    exchange_id: ExchangeId,
    session_id: Uuid,
    log: Vec<Turn>,
    window_start: usize,
}

impl ConversationBuffer {
    pub fn new(exchange_id: ExchangeId) -> Self {
        Self {
            exchange_id,
            session_id: Uuid::new_v4(),
            log: Vec::new(),
            window_start: 0,
        }
    }

    pub fn exchange_id(&self) -> &ExchangeId {
        &self.exchange_id
    }

    /// Identifier of the current logical session. A reset replaces it, which
    /// is how an in-flight generation learns its context went stale.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Appends a turn to the log and the active window.
    pub fn append(&mut self, turn: Turn) {
        self.log.push(turn);
    }

    /// Evicts the oldest turn still in the active window. Returns `false`
    /// when the window is already empty.
    pub fn dequeue(&mut self) -> bool {
        if self.window_start >= self.log.len() {
            return false;
        }
        self.window_start += 1;
        true
    }

    /// The turns still eligible for prompting, oldest first.
    pub fn active_window(&self) -> &[Turn] {
        &self.log[self.window_start..]
    }

    /// Every turn since the last reset, including evicted ones.
    pub fn full_log(&self) -> &[Turn] {
        &self.log
    }

    pub fn window_start(&self) -> usize {
        self.window_start
    }

    /// Replaces the turn at `index`, an index into the full log. Returns
    /// `false` when the index is out of range.
    pub fn amend(&mut self, index: usize, turn: Turn) -> bool {
        match self.log.get_mut(index) {
            Some(slot) => {
                *slot = turn;
                true
            }
            None => false,
        }
    }

    /// Most recent turn in the active window spoken by `speaker`, scanning
    /// backwards. The returned index points into the full log and stays
    /// valid for [`amend`](Self::amend) until the next reset.
    pub fn find_last(&self, speaker: &str) -> Option<(usize, &Turn)> {
        self.log
            .iter()
            .enumerate()
            .skip(self.window_start)
            .rev()
            .find(|(_, turn)| turn.is_by(speaker))
    }

    /// Writes the full log to `store`, then clears it and starts a fresh
    /// session. Persistence failures are logged and swallowed; the reset
    /// itself always happens.
    pub async fn persist_and_reset(&mut self, store: &dyn TranscriptStore) {
        if self.log.is_empty() {
            debug!(exchange = %self.exchange_id, "Nothing to persist, resetting empty buffer");
        } else if let Err(e) = store.persist(&self.exchange_id, &self.log).await {
            warn!(
                exchange = %self.exchange_id,
                error = %e,
                "Failed to persist transcript before reset"
            );
        }
        self.log.clear();
        self.window_start = 0;
        self.session_id = Uuid::new_v4();
    }
}
