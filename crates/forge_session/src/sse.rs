//! Server-sent event decoding for the chat endpoint.
//!
//! The endpoint emits `data: {"text": "..."}` lines and finishes with
//! `data: [DONE]`. Chunks from the transport can split lines (and UTF-8
//! sequences) anywhere, so bytes are buffered until a full line is seen.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Deserialize;

use crate::error::{SessionError, SessionResult};

/// Stream of text fragments produced by a chat backend
pub type TextStream = BoxStream<'static, SessionResult<String>>;

/// A decoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Text(String),
    /// Error reported by the endpoint, or an undecodable payload
    Error(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Incremental line decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a transport chunk, returning every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            events.extend(parse_line(&line));
        }
        events
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.pending);
        parse_line(&line).into_iter().collect()
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(data) = line.strip_prefix("data:") else {
        // comments, event names, ids and blank separators
        return None;
    };
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let payload: StreamPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => return Some(SseEvent::Error(format!("invalid event payload: {}", e))),
    };

    if let Some(error) = payload.error {
        let message = match error {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        return Some(SseEvent::Error(message));
    }

    payload
        .text
        .filter(|t| !t.is_empty())
        .map(SseEvent::Text)
}

struct DecodeState<B, E> {
    inner: BoxStream<'static, Result<B, E>>,
    decoder: SseDecoder,
    queue: VecDeque<SessionResult<String>>,
    finished: bool,
}

impl<B, E> DecodeState<B, E> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Text(text) => self.queue.push_back(Ok(text)),
                SseEvent::Error(message) => {
                    self.queue.push_back(Err(SessionError::Stream(message)));
                    self.finished = true;
                    break;
                }
                SseEvent::Done => {
                    self.finished = true;
                    break;
                }
            }
        }
    }
}

/// Turn a raw byte stream into a stream of text fragments.
///
/// The stream ends at `[DONE]` or when the body ends; the first decode or
/// transport error is yielded and ends the stream.
pub fn text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        inner: bytes.boxed(),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(chunk.as_ref());
                    state.absorb(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(SessionError::Transport(e.to_string())), state));
                }
                None => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
