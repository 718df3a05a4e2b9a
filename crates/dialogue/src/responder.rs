//! The generation pipeline: render, fit, stream, truncate, filter, commit.
//!
//! One [`Responder`] serves every exchange in the process. It holds the
//! engine, the formatter, the sampling knobs, and the content filter, and
//! drives a single inbound event through the full pipeline. Callers must
//! not run two `respond()` calls against the same buffer concurrently;
//! different buffers are fine and only contend on the engine permits.

use std::sync::Arc;

use palaver_core::error::EngineError;
use palaver_core::{Engine, SamplingParams, Turn};
use palaver_safety::ContentFilter;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use crate::buffer::ConversationBuffer;
use crate::formatter::PromptFormatter;

/// A conversation buffer shared between the event loop and in-flight
/// generations. Locked briefly for rendering and for the commit; never held
/// across an engine call.
pub type SharedBuffer = Arc<Mutex<ConversationBuffer>>;

#[derive(Debug, Error)]
pub enum RespondError {
    /// The prompt exceeds the context budget even with an empty window.
    /// Misconfiguration (oversized preamble or undersized context), not a
    /// transient fault.
    #[error(
        "Prompt does not fit the context budget even with an empty window \
         ({prompt_tokens} tokens, budget {budget})"
    )]
    ContextUnavailable { prompt_tokens: usize, budget: usize },

    #[error("Generation failed: {0}")]
    Generation(#[from] EngineError),
}

/// What became of one generation attempt. Only `Reply` carries text for the
/// channel; the rest are deliberate silence.
#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    /// The accepted reply, already appended to the buffer.
    Reply(Turn),
    /// The model produced nothing but whitespace.
    Empty,
    /// The reply contained a blocked term.
    Filtered,
    /// The conversation was reset while the reply was being generated.
    Discarded,
}

pub struct Responder {
    engine: Arc<dyn Engine>,
    formatter: PromptFormatter,
    sampling: SamplingParams,
    filter: ContentFilter,
    permits: Arc<Semaphore>,
}

impl Responder {
    pub fn new(engine: Arc<dyn Engine>, formatter: PromptFormatter) -> Self {
        Self {
            engine,
            formatter,
            sampling: SamplingParams::default(),
            filter: palaver_safety::global().clone(),
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = filter;
        self
    }

    /// How many generations may run on the engine at once, across all
    /// exchanges.
    pub fn with_concurrency(mut self, permits: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    /// The name the bot replies under.
    pub fn speaker(&self) -> &str {
        self.formatter.speaker()
    }

    pub fn formatter(&self) -> &PromptFormatter {
        &self.formatter
    }

    /// The engine's context window, in its own length unit.
    pub fn context_window(&self) -> usize {
        self.engine.max_context()
    }

    /// Generates one reply for the buffer's current window.
    ///
    /// The buffer is locked while the prompt is fitted and again for the
    /// final commit, but not during generation, so fresh turns can land
    /// mid-stream. A reset between the two lockings makes the result
    /// `Discarded`.
    pub async fn respond(&self, buffer: &SharedBuffer) -> Result<ResponseOutcome, RespondError> {
        let (prompt, session_id) = {
            let mut guard = buffer.lock().await;
            let prompt = self.fit_prompt(&mut guard)?;
            (prompt, guard.session_id())
        };

        debug!(
            engine = self.engine.name(),
            prompt_tokens = self.engine.estimate_length(&prompt),
            "Prompt fits the context budget"
        );

        let raw = {
            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return Err(
                        EngineError::Backend("generation permits closed".to_string()).into()
                    );
                }
            };
            self.stream_completion(&prompt).await?
        };
        let text = raw.trim();

        let mut guard = buffer.lock().await;
        if guard.session_id() != session_id {
            debug!("Conversation was reset mid-generation, discarding the reply");
            return Ok(ResponseOutcome::Discarded);
        }
        if text.is_empty() {
            debug!("Model produced only whitespace, staying quiet");
            return Ok(ResponseOutcome::Empty);
        }
        if self.filter.matches(text) {
            debug!(
                speaker = self.formatter.speaker(),
                text, "Reply contained a blocked term, dropping it"
            );
            return Ok(ResponseOutcome::Filtered);
        }

        let turn = Turn::new(self.formatter.speaker(), text);
        guard.append(turn.clone());
        info!(
            speaker = self.formatter.speaker(),
            chars = turn.text.len(),
            "Reply accepted"
        );
        Ok(ResponseOutcome::Reply(turn))
    }

    /// Renders the window and evicts oldest turns until the prompt leaves
    /// room for `max_tokens` of output. Errors when even an empty window
    /// does not fit.
    fn fit_prompt(&self, buffer: &mut ConversationBuffer) -> Result<String, RespondError> {
        let budget = self
            .engine
            .max_context()
            .saturating_sub(self.sampling.max_tokens);
        let now = chrono::Utc::now();

        let mut prompt = self.formatter.render(buffer.active_window(), now);
        while self.engine.estimate_length(&prompt) >= budget {
            if !buffer.dequeue() {
                return Err(RespondError::ContextUnavailable {
                    prompt_tokens: self.engine.estimate_length(&prompt),
                    budget,
                });
            }
            debug!(
                window = buffer.active_window().len(),
                "Evicted the oldest turn to fit the context budget"
            );
            prompt = self.formatter.render(buffer.active_window(), now);
        }
        Ok(prompt)
    }

    /// Consumes the engine's delta stream, truncating at the first stop
    /// match. Deltas carry only the continuation, so the accumulator is
    /// exactly the post-prompt suffix. Breaking early drops the receiver,
    /// which tells the backend to stop producing.
    async fn stream_completion(&self, prompt: &str) -> Result<String, RespondError> {
        let mut rx = self.engine.generate_stream(prompt, &self.sampling).await?;
        let stop = self.formatter.stop_pattern();
        let mut output = String::new();
        while let Some(delta) = rx.recv().await {
            let delta = delta?;
            if let Some(text) = delta.text {
                output.push_str(&text);
                if let Some(m) = stop.find(&output) {
                    output.truncate(m.start());
                    break;
                }
            }
            if delta.done {
                break;
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use palaver_core::{estimate_tokens, ExchangeId, StreamDelta};
    use palaver_transcript::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    use crate::buffer::ConversationBuffer;

    type DeltaReceiver = mpsc::Receiver<Result<StreamDelta, EngineError>>;

    struct ScriptEngine {
        deltas: Vec<String>,
        max_context: usize,
    }

    impl ScriptEngine {
        fn new(deltas: &[&str]) -> Self {
            Self {
                deltas: deltas.iter().map(|d| d.to_string()).collect(),
                max_context: 2048,
            }
        }

        fn with_max_context(mut self, max_context: usize) -> Self {
            self.max_context = max_context;
            self
        }
    }

    #[async_trait]
    impl Engine for ScriptEngine {
        fn name(&self) -> &str {
            "script"
        }

        fn estimate_length(&self, text: &str) -> usize {
            estimate_tokens(text)
        }

        fn max_context(&self) -> usize {
            self.max_context
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _sampling: &SamplingParams,
        ) -> Result<DeltaReceiver, EngineError> {
            let (tx, rx) = mpsc::channel(16);
            let deltas = self.deltas.clone();
            tokio::spawn(async move {
                for delta in deltas {
                    if tx.send(Ok(StreamDelta::text(delta))).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(Ok(StreamDelta::done())).await;
            });
            Ok(rx)
        }
    }

    fn seeded(turns: &[(&str, &str)]) -> SharedBuffer {
        let mut buffer = ConversationBuffer::new(ExchangeId::new("test_room"));
        for (speaker, text) in turns {
            buffer.append(Turn::new(*speaker, *text));
        }
        Arc::new(Mutex::new(buffer))
    }

    fn responder(engine: impl Engine + 'static) -> Responder {
        Responder::new(
            Arc::new(engine),
            PromptFormatter::new("Two friends are talking.", "Palaver"),
        )
        .with_filter(ContentFilter::empty())
    }

    #[tokio::test]
    async fn keeps_the_reply_before_a_forged_turn_tag() {
        let buffer = seeded(&[("user", "hi")]);
        let outcome = responder(ScriptEngine::new(&["hello!\n[9:00]<user>bye"]))
            .respond(&buffer)
            .await
            .unwrap();

        match outcome {
            ResponseOutcome::Reply(turn) => assert_eq!(turn.text, "hello!"),
            other => panic!("expected a reply, got {other:?}"),
        }
        let guard = buffer.lock().await;
        assert_eq!(guard.active_window().len(), 2);
        assert!(guard.active_window()[1].is_by("Palaver"));
    }

    #[tokio::test]
    async fn truncates_a_fabricated_followup_split_across_deltas() {
        let buffer = seeded(&[("alice", "hi")]);
        let engine = ScriptEngine::new(&["Hello the", "re\n[12:0", "0]<Other>gotcha"]);
        let outcome = responder(engine).respond(&buffer).await.unwrap();

        match outcome {
            ResponseOutcome::Reply(turn) => assert_eq!(turn.text, "Hello there"),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_completion_passes_through() {
        let buffer = seeded(&[("alice", "how goes it")]);
        let outcome = responder(ScriptEngine::new(&["all ", "good"]))
            .respond(&buffer)
            .await
            .unwrap();

        match outcome {
            ResponseOutcome::Reply(turn) => assert_eq!(turn.text, "all good"),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn whitespace_only_reply_is_rejected() {
        let buffer = seeded(&[("alice", "hi")]);
        let outcome = responder(ScriptEngine::new(&["  \t "]))
            .respond(&buffer)
            .await
            .unwrap();

        assert!(matches!(outcome, ResponseOutcome::Empty));
        assert_eq!(buffer.lock().await.active_window().len(), 1);
    }

    #[tokio::test]
    async fn filtered_reply_leaves_the_buffer_unchanged() {
        let buffer = seeded(&[("alice", "hi")]);
        let outcome = responder(ScriptEngine::new(&["you utter BadWord"]))
            .with_filter(ContentFilter::from_terms(["badword"]).unwrap())
            .respond(&buffer)
            .await
            .unwrap();

        assert!(matches!(outcome, ResponseOutcome::Filtered));
        assert_eq!(buffer.lock().await.active_window().len(), 1);
    }

    #[tokio::test]
    async fn evicts_oldest_turns_until_the_prompt_fits() {
        let buffer = seeded(&[
            ("alice", "the quick brown fox jumps over the lazy dog"),
            ("bob", "again and again the quick brown fox jumps"),
            ("alice", "someone should really stop that fox by now"),
            ("bob", "the dog does not seem to mind it at all"),
            ("alice", "classic dog behaviour if you ask me"),
            ("bob", "truly the least bothered animal around"),
        ]);
        let engine = ScriptEngine::new(&["fox update appreciated"]).with_max_context(50);
        let outcome = responder(engine)
            .with_sampling(SamplingParams {
                max_tokens: 10,
                ..Default::default()
            })
            .respond(&buffer)
            .await
            .unwrap();

        assert!(matches!(outcome, ResponseOutcome::Reply(_)));
        let guard = buffer.lock().await;
        assert!(guard.window_start() > 0, "nothing was evicted");
        assert_eq!(guard.full_log().len(), 7);
    }

    #[tokio::test]
    async fn errors_when_even_an_empty_window_is_too_long() {
        let buffer = seeded(&[("alice", "hi")]);
        let engine = ScriptEngine::new(&["unreachable"]).with_max_context(20);
        let err = responder(engine).respond(&buffer).await.unwrap_err();

        assert!(matches!(
            err,
            RespondError::ContextUnavailable { budget: 0, .. }
        ));
        let guard = buffer.lock().await;
        assert!(guard.active_window().is_empty());
        assert_eq!(guard.full_log().len(), 1);
    }

    #[tokio::test]
    async fn reset_mid_generation_discards_the_reply() {
        struct GatedEngine {
            started: Mutex<Option<oneshot::Sender<()>>>,
            release: Mutex<Option<oneshot::Receiver<()>>>,
        }

        #[async_trait]
        impl Engine for GatedEngine {
            fn name(&self) -> &str {
                "gated"
            }

            fn estimate_length(&self, text: &str) -> usize {
                estimate_tokens(text)
            }

            fn max_context(&self) -> usize {
                2048
            }

            async fn generate_stream(
                &self,
                _prompt: &str,
                _sampling: &SamplingParams,
            ) -> Result<DeltaReceiver, EngineError> {
                let started = self.started.lock().await.take();
                let release = self.release.lock().await.take();
                let (tx, rx) = mpsc::channel(4);
                tokio::spawn(async move {
                    if let Some(started) = started {
                        let _ = started.send(());
                    }
                    if let Some(release) = release {
                        let _ = release.await;
                    }
                    let _ = tx.send(Ok(StreamDelta::text("late reply"))).await;
                    let _ = tx.send(Ok(StreamDelta::done())).await;
                });
                Ok(rx)
            }
        }

        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let engine = GatedEngine {
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        let responder = Arc::new(responder(engine));
        let buffer = seeded(&[("alice", "hi")]);
        let store = MemoryStore::new();

        let task = tokio::spawn({
            let responder = responder.clone();
            let buffer = buffer.clone();
            async move { responder.respond(&buffer).await }
        });

        started_rx.await.unwrap();
        buffer.lock().await.persist_and_reset(&store).await;
        release_tx.send(()).unwrap();

        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, ResponseOutcome::Discarded));
        assert!(buffer.lock().await.full_log().is_empty());
        assert_eq!(store.persisted().len(), 1);
    }

    #[tokio::test]
    async fn early_truncation_cancels_the_backend() {
        struct EndlessEngine {
            cancelled: Arc<AtomicBool>,
        }

        #[async_trait]
        impl Engine for EndlessEngine {
            fn name(&self) -> &str {
                "endless"
            }

            fn estimate_length(&self, text: &str) -> usize {
                estimate_tokens(text)
            }

            fn max_context(&self) -> usize {
                2048
            }

            async fn generate_stream(
                &self,
                _prompt: &str,
                _sampling: &SamplingParams,
            ) -> Result<DeltaReceiver, EngineError> {
                let (tx, rx) = mpsc::channel(4);
                let cancelled = self.cancelled.clone();
                tokio::spawn(async move {
                    let mut sent_stop = false;
                    loop {
                        let delta = if sent_stop {
                            "filler"
                        } else {
                            sent_stop = true;
                            "Never stopping\n[10:00]<ghost>boo"
                        };
                        if tx.send(Ok(StreamDelta::text(delta))).await.is_err() {
                            cancelled.store(true, Ordering::SeqCst);
                            return;
                        }
                    }
                });
                Ok(rx)
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let engine = EndlessEngine {
            cancelled: cancelled.clone(),
        };
        let buffer = seeded(&[("alice", "hi")]);
        let outcome = responder(engine).respond(&buffer).await.unwrap();

        match outcome {
            ResponseOutcome::Reply(turn) => assert_eq!(turn.text, "Never stopping"),
            other => panic!("expected a reply, got {other:?}"),
        }
        for _ in 0..200 {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(cancelled.load(Ordering::SeqCst), "backend never saw the drop");
    }
}
