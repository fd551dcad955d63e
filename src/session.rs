//! Chat session controller: owns the history and runs one turn at a time.

use crate::ai::{
    ChatBackend, ChatError, ChatRequest, ChatResult, HttpBackend, StreamEvent, StreamReader,
    TemplateKwargs,
};
use crate::config::ChatConfig;
use crate::history::History;
use crate::render::Renderer;
use crate::settings::GenerationSettings;
use crate::types::ChatMessage;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending,
    Streaming,
}

/// Admission control for turns: Idle -> Sending | Streaming -> Idle.
#[derive(Clone, Debug, Default)]
pub struct TurnGate {
    phase: Arc<Mutex<TurnPhase>>,
}

impl TurnGate {
    pub fn phase(&self) -> TurnPhase {
        *self.lock()
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == TurnPhase::Idle
    }

    fn acquire(&self) -> ChatResult<TurnPermit> {
        let mut phase = self.lock();
        if *phase != TurnPhase::Idle {
            return Err(ChatError::Busy);
        }
        *phase = TurnPhase::Sending;
        Ok(TurnPermit { gate: self.clone() })
    }

    fn set(&self, next: TurnPhase) {
        *self.lock() = next;
    }

    fn lock(&self) -> MutexGuard<'_, TurnPhase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held for the lifetime of a turn; dropping it reopens the gate.
struct TurnPermit {
    gate: TurnGate,
}

impl TurnPermit {
    fn enter(&self, phase: TurnPhase) {
        self.gate.set(phase);
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        self.gate.set(TurnPhase::Idle);
    }
}

/// A committed assistant reply.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    pub elapsed: Duration,
}

/// One conversation with the endpoint.
///
/// Cloning is cheap and every clone shares the same history, gate and
/// cancellation slot.
#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    model: Option<String>,
    stream_idle_timeout: Option<Duration>,
    history: Arc<Mutex<History>>,
    gate: TurnGate,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            model: None,
            stream_idle_timeout: None,
            history: Arc::new(Mutex::new(History::new())),
            gate: TurnGate::default(),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        let backend = HttpBackend::new(&config.endpoint).with_api_key(config.api_key.clone());
        Self::new(Arc::new(backend))
            .with_model(config.model.clone())
            .with_stream_idle_timeout(config.stream_idle_timeout)
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Bounds every wait on the endpoint, including the wait for response
    /// headers and a whole buffered exchange.
    pub fn with_stream_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.stream_idle_timeout = idle_timeout;
        self
    }

    pub fn phase(&self) -> TurnPhase {
        self.gate.phase()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock_history().turns().to_vec()
    }

    /// Empties the history. Refused while a turn is running.
    pub fn clear_history(&self) -> ChatResult<()> {
        let _permit = self.gate.acquire()?;
        self.lock_history().clear();
        tracing::info!("history cleared");
        Ok(())
    }

    /// Aborts the running turn, if any. Nothing from it is committed.
    pub fn cancel_current(&self) {
        self.lock_cancel().cancel();
    }

    /// Builds the outbound body for `messages`.
    ///
    /// With a model set the request goes straight to the upstream server, so
    /// the reasoning effort travels in `chat_template_kwargs`. Without one the
    /// proxy receives it as a top-level field.
    pub fn build_request(
        &self,
        messages: &[ChatMessage],
        settings: &GenerationSettings,
    ) -> ChatRequest {
        let effort = settings.reasoning_effort().map(str::to_string);
        let (reasoning_effort, chat_template_kwargs) = match (&self.model, effort) {
            (Some(_), Some(effort)) => (
                None,
                Some(TemplateKwargs {
                    reasoning_effort: effort,
                }),
            ),
            (_, effort) => (effort, None),
        };
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            reasoning_effort,
            chat_template_kwargs,
            stream: settings.streaming_mode,
        }
    }

    /// Sends `text` as a user turn and renders the reply.
    ///
    /// Errors have already been rendered when they are returned; only a
    /// successful reply is committed to the history.
    pub async fn send<R: Renderer + ?Sized>(
        &self,
        text: &str,
        settings: &GenerationSettings,
        renderer: &mut R,
    ) -> ChatResult<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let permit = self.gate.acquire()?;

        let request = {
            let mut history = self.lock_history();
            history.push_user(text);
            self.build_request(history.turns(), settings)
        };
        renderer.push_user(text);

        let cancel = self.fresh_cancel_token();
        let started = Instant::now();
        if request.stream {
            permit.enter(TurnPhase::Streaming);
            self.stream_turn(&request, cancel, started, renderer).await
        } else {
            self.complete_turn(&request, cancel, started, renderer).await
        }
    }

    async fn complete_turn<R: Renderer + ?Sized>(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
        started: Instant,
        renderer: &mut R,
    ) -> ChatResult<TurnOutcome> {
        let exchange = self.backend.complete(request);
        let reply = match bounded_wait(&cancel, self.stream_idle_timeout, exchange).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!("chat request failed: {err}");
                renderer.show_error(&error_text(&err));
                return Err(err);
            }
        };

        let elapsed = started.elapsed();
        self.lock_history().push_assistant(reply.as_str());
        renderer.push_assistant(&reply, elapsed);
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "reply received");
        Ok(TurnOutcome { reply, elapsed })
    }

    async fn stream_turn<R: Renderer + ?Sized>(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
        started: Instant,
        renderer: &mut R,
    ) -> ChatResult<TurnOutcome> {
        renderer.begin_assistant();

        let opening = self.backend.open_stream(request);
        let body = match bounded_wait(&cancel, self.stream_idle_timeout, opening).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("stream request failed: {err}");
                renderer.fail_assistant(&error_text(&err));
                return Err(err);
            }
        };

        let mut reader =
            StreamReader::new(body, cancel).with_idle_timeout(self.stream_idle_timeout);
        if let Err(err) = pump(&mut reader, renderer).await {
            tracing::warn!(
                received = reader.content().len(),
                "stream aborted, partial reply dropped: {err}"
            );
            renderer.fail_assistant(&error_text(&err));
            return Err(err);
        }

        let elapsed = started.elapsed();
        let skipped = reader.malformed_frames();
        let reply = reader.into_content();
        renderer.finish_assistant(elapsed);
        self.lock_history().push_assistant(reply.as_str());
        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            skipped_frames = skipped,
            "stream finished"
        );
        Ok(TurnOutcome { reply, elapsed })
    }

    fn fresh_cancel_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock_cancel() = token.clone();
        token
    }

    fn lock_history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drives the reader until end of body or sentinel, redrawing the whole
/// reply after each delta.
async fn pump<R: Renderer + ?Sized>(
    reader: &mut StreamReader,
    renderer: &mut R,
) -> ChatResult<()> {
    while let Some(event) = reader.next_event().await? {
        match event {
            StreamEvent::Delta(_) => renderer.update_assistant(reader.content()),
            StreamEvent::Done => break,
            StreamEvent::ServerError(message) => return Err(ChatError::Server(message)),
        }
    }
    Ok(())
}

/// Waits on the endpoint, giving up on cancellation or once `deadline` passes.
async fn bounded_wait<T>(
    cancel: &CancellationToken,
    deadline: Option<Duration>,
    work: impl Future<Output = ChatResult<T>>,
) -> ChatResult<T> {
    let timed = async {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| ChatError::Timeout(limit))?,
            None => work.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChatError::Cancelled),
        result = timed => result,
    }
}

fn error_text(err: &ChatError) -> String {
    format!("Error: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ByteStream;
    use crate::render::Transcript;
    use async_trait::async_trait;

    struct FixedReply(&'static str);

    #[async_trait]
    impl ChatBackend for FixedReply {
        async fn complete(&self, _request: &ChatRequest) -> ChatResult<String> {
            Ok(self.0.to_string())
        }

        async fn open_stream(&self, _request: &ChatRequest) -> ChatResult<ByteStream> {
            Err(ChatError::Transport("streaming unsupported".to_string()))
        }
    }

    fn high_effort() -> GenerationSettings {
        GenerationSettings {
            temperature: 0.3,
            max_tokens: 800,
            reasoning_effort: "high".to_string(),
            streaming_mode: true,
        }
    }

    #[test]
    fn proxy_request_carries_effort_at_top_level() {
        let session = ChatSession::new(Arc::new(FixedReply("ok")));
        let request = session.build_request(&[ChatMessage::user("hello")], &high_effort());

        assert_eq!(request.model, None);
        assert_eq!(request.messages, vec![ChatMessage::user("hello")]);
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.max_tokens, 800);
        assert!(request.stream);

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["reasoning_effort"], "high");
        assert!(body.get("chat_template_kwargs").is_none());
        assert!(body.get("model").is_none());
    }

    #[test]
    fn direct_request_wraps_effort_in_template_kwargs() {
        let session =
            ChatSession::new(Arc::new(FixedReply("ok"))).with_model(Some("gpt-oss-120b".into()));
        let request = session.build_request(&[ChatMessage::user("hello")], &high_effort());

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "gpt-oss-120b");
        assert_eq!(body["chat_template_kwargs"]["reasoning_effort"], "high");
        assert!(body.get("reasoning_effort").is_none());
        assert_eq!(body["max_tokens"], 800);
    }

    #[test]
    fn direct_request_without_effort_has_no_template_kwargs() {
        let session = ChatSession::new(Arc::new(FixedReply("ok"))).with_model(Some("m".into()));
        let request =
            session.build_request(&[ChatMessage::user("hello")], &GenerationSettings::default());

        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("chat_template_kwargs").is_none());
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn gate_admits_one_turn_at_a_time() {
        let gate = TurnGate::default();
        let permit = gate.acquire().unwrap();
        assert_eq!(gate.phase(), TurnPhase::Sending);
        assert!(matches!(gate.acquire(), Err(ChatError::Busy)));

        permit.enter(TurnPhase::Streaming);
        assert_eq!(gate.phase(), TurnPhase::Streaming);

        drop(permit);
        assert!(gate.is_idle());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let session = ChatSession::new(Arc::new(FixedReply("ok")));
        let mut transcript = Transcript::new();
        let result = session
            .send("   ", &GenerationSettings::default(), &mut transcript)
            .await;
        assert_eq!(result, Err(ChatError::EmptyMessage));
        assert!(session.history().is_empty());
        assert!(transcript.bubbles().is_empty());
    }

    #[tokio::test]
    async fn gate_reopens_after_failed_stream() {
        let session = ChatSession::new(Arc::new(FixedReply("ok")));
        let settings = GenerationSettings {
            streaming_mode: true,
            ..GenerationSettings::default()
        };
        let mut transcript = Transcript::new();
        let result = session.send("hi", &settings, &mut transcript).await;

        assert!(matches!(result, Err(ChatError::Transport(_))));
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert_eq!(session.history(), vec![ChatMessage::user("hi")]);
        assert!(transcript.bubbles()[1].is_error);
    }
}
