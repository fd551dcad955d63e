//! Incremental decoder for `data:`-framed completion streams.
//!
//! Chunks may split a UTF-8 sequence, a line, or a JSON payload anywhere.
//! The decoder carries incomplete bytes and the unterminated line forward,
//! so the accumulated reply is the same however the body was chunked.

use super::client::{ByteStream, ChatError, ChatResult};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// A non-empty content fragment, already appended to the accumulated reply.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
    /// A frame carrying a non-empty `error` field.
    ServerError(String),
}

impl StreamEvent {
    fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta(_))
    }
}

#[derive(Deserialize)]
struct FrameDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct FrameChoice {
    delta: Option<FrameDelta>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameError {
    Text(String),
    Detail { message: String },
    Other(serde_json::Value),
}

#[derive(Deserialize)]
struct StreamFrame {
    choices: Option<Vec<FrameChoice>>,
    error: Option<FrameError>,
}

impl StreamFrame {
    fn error_message(&self) -> Option<String> {
        let message = match self.error.as_ref()? {
            FrameError::Text(text) => text.clone(),
            FrameError::Detail { message } => message.clone(),
            FrameError::Other(serde_json::Value::Bool(false)) => return None,
            FrameError::Other(value) => value.to_string(),
        };
        (!message.trim().is_empty()).then_some(message)
    }

    fn into_delta(self) -> Option<String> {
        self.choices?
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|piece| !piece.is_empty())
    }
}

/// Per-turn decode state: byte carry, line carry and the reply so far.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending_bytes: Vec<u8>,
    line_carry: String,
    content: String,
    malformed_frames: usize,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one chunk and returns the events it completed.
    ///
    /// Lines end at `\n`; a trailing `\r` is stripped, so CRLF bodies decode
    /// the same. Nothing is returned once a terminal event has been produced.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let text = self.decode_utf8(chunk);
        self.line_carry.push_str(&text);

        let mut events = Vec::new();
        while let Some(pos) = self.line_carry.find('\n') {
            let line: String = self.line_carry.drain(..=pos).collect();
            if let Some(event) = self.process_line(&line) {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    self.finish_early();
                    break;
                }
            }
        }
        events
    }

    /// Flushes whatever is left when the body ends without a final newline.
    ///
    /// An incomplete UTF-8 sequence still held at this point is decoded
    /// lossily, becoming U+FFFD.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut tail = std::mem::take(&mut self.line_carry);
        if !self.pending_bytes.is_empty() {
            tail.push_str(&String::from_utf8_lossy(&self.pending_bytes));
            self.pending_bytes.clear();
        }
        self.finished = true;
        self.process_line(&tail).into_iter().collect()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    /// Frames whose payload failed to parse and were skipped.
    pub fn malformed_frames(&self) -> usize {
        self.malformed_frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish_early(&mut self) {
        self.finished = true;
        self.line_carry.clear();
        self.pending_bytes.clear();
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut buffer = std::mem::take(&mut self.pending_bytes);
        buffer.extend_from_slice(chunk);

        let mut out = String::with_capacity(buffer.len());
        let mut rest: &[u8] = &buffer;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end: wait for the next chunk.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending_bytes = rest.to_vec();
        out
    }

    fn process_line(&mut self, raw: &str) -> Option<StreamEvent> {
        let line = raw.trim_end_matches(['\n', '\r']);
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();
        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            return Some(StreamEvent::Done);
        }

        let frame: StreamFrame = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(err) => {
                self.malformed_frames += 1;
                tracing::debug!(
                    skipped = self.malformed_frames,
                    "skipping unparsable stream frame: {err}"
                );
                return None;
            }
        };

        if let Some(message) = frame.error_message() {
            return Some(StreamEvent::ServerError(message));
        }
        let piece = frame.into_delta()?;
        self.content.push_str(&piece);
        Some(StreamEvent::Delta(piece))
    }
}

/// Pulls events out of a streamed body one at a time.
///
/// Reads can be abandoned through the cancellation token or an optional
/// idle deadline between chunks.
pub struct StreamReader {
    body: ByteStream,
    decoder: StreamDecoder,
    queued: VecDeque<StreamEvent>,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
    exhausted: bool,
}

impl StreamReader {
    pub fn new(body: ByteStream, cancel: CancellationToken) -> Self {
        Self {
            body,
            decoder: StreamDecoder::new(),
            queued: VecDeque::new(),
            cancel,
            idle_timeout: None,
            exhausted: false,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Next decoded event, or `None` once the body ended or a terminal
    /// event was already handed out.
    pub async fn next_event(&mut self) -> ChatResult<Option<StreamEvent>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(Some(event));
            }
            if self.exhausted || self.decoder.is_finished() {
                return Ok(None);
            }
            match self.read_chunk().await? {
                Some(chunk) => {
                    let events = self.decoder.feed(&chunk?);
                    self.queued.extend(events);
                }
                None => {
                    self.exhausted = true;
                    let events = self.decoder.finish();
                    self.queued.extend(events);
                }
            }
        }
    }

    pub fn content(&self) -> &str {
        self.decoder.content()
    }

    pub fn into_content(self) -> String {
        self.decoder.into_content()
    }

    pub fn malformed_frames(&self) -> usize {
        self.decoder.malformed_frames()
    }

    async fn read_chunk(&mut self) -> ChatResult<Option<ChatResult<Vec<u8>>>> {
        let idle_timeout = self.idle_timeout;
        let cancel = &self.cancel;
        let next = self.body.next();
        let read = async move {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, next)
                    .await
                    .map_err(|_| ChatError::Timeout(limit)),
                None => Ok(next.await),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = read => result,
        }
    }
}
