//! Scripted collaborators for testing.
//!
//! [`MockChatBackend`] and [`MockGenerator`] replay queued responses in order
//! and capture every request, so sessions can be driven without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use crate::backend::{ChatBackend, ChatRequest, GenerateRequest, GenerateResponse, ProjectGenerator};
use crate::error::{SessionError, SessionResult};
use crate::sse::TextStream;
use crate::types::Artifact;

/// Scripted outcome of one chat request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Stream these fragments, then end
    Stream(Vec<String>),
    /// Fail before any stream is produced
    OpenError(String),
    /// Stream these fragments, then fail
    StreamError { fragments: Vec<String>, error: String },
    /// Stream these fragments, then never finish
    Stall(Vec<String>),
}

impl MockReply {
    pub fn text(fragments: &[&str]) -> Self {
        Self::Stream(owned(fragments))
    }

    pub fn open_error(message: impl Into<String>) -> Self {
        Self::OpenError(message.into())
    }

    pub fn stream_error(fragments: &[&str], error: impl Into<String>) -> Self {
        Self::StreamError {
            fragments: owned(fragments),
            error: error.into(),
        }
    }

    pub fn stall(fragments: &[&str]) -> Self {
        Self::Stall(owned(fragments))
    }
}

fn owned(fragments: &[&str]) -> Vec<String> {
    fragments.iter().map(|f| f.to_string()).collect()
}

fn fragment_stream(fragments: Vec<String>) -> impl futures::Stream<Item = SessionResult<String>> {
    stream::iter(fragments.into_iter().map(Ok))
}

/// Chat backend replaying [`MockReply`] values in order
#[derive(Clone, Default)]
pub struct MockChatBackend {
    replies: Arc<RwLock<Vec<MockReply>>>,
    reply_index: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<ChatRequest>>>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next chat request.
    pub fn add_reply(self, reply: MockReply) -> Self {
        self.replies.write().push(reply);
        self
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().len()
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn stream_chat(&self, request: ChatRequest) -> SessionResult<TextStream> {
        self.requests.write().push(request);

        let index = self.reply_index.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .read()
            .get(index)
            .cloned()
            .ok_or_else(|| SessionError::Transport(format!("no scripted reply #{}", index + 1)))?;

        match reply {
            MockReply::Stream(fragments) => Ok(fragment_stream(fragments).boxed()),
            MockReply::OpenError(message) => Err(SessionError::Transport(message)),
            MockReply::StreamError { fragments, error } => Ok(fragment_stream(fragments)
                .chain(stream::once(async move { Err(SessionError::Stream(error)) }))
                .boxed()),
            MockReply::Stall(fragments) => Ok(fragment_stream(fragments)
                .chain(stream::pending())
                .boxed()),
        }
    }
}

/// Scripted outcome of one generation request
#[derive(Debug, Clone)]
pub enum MockGeneration {
    Files(Vec<Artifact>),
    Fail(String),
    Http { status: u16, body: String },
    /// Never return
    Stall,
}

/// Project generator replaying [`MockGeneration`] values in order
#[derive(Clone, Default)]
pub struct MockGenerator {
    responses: Arc<RwLock<Vec<MockGeneration>>>,
    response_index: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<GenerateRequest>>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response for the next generation request.
    pub fn add_response(self, response: MockGeneration) -> Self {
        self.responses.write().push(response);
        self
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().len()
    }
}

#[async_trait]
impl ProjectGenerator for MockGenerator {
    async fn generate(&self, request: GenerateRequest) -> SessionResult<GenerateResponse> {
        self.requests.write().push(request);

        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        let response = self.responses.read().get(index).cloned();

        match response {
            Some(MockGeneration::Files(files)) => Ok(GenerateResponse { files }),
            Some(MockGeneration::Fail(message)) => Err(SessionError::Transport(message)),
            Some(MockGeneration::Http { status, body }) => Err(SessionError::Http { status, body }),
            Some(MockGeneration::Stall) => futures::future::pending().await,
            None => Err(SessionError::Transport(format!(
                "no scripted generation #{}",
                index + 1
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_replies_in_order() {
        let backend = MockChatBackend::new()
            .add_reply(MockReply::text(&["a", "b"]))
            .add_reply(MockReply::open_error("offline"));
        let request = ChatRequest {
            messages: Vec::new(),
            context: String::new(),
        };

        let stream = backend.stream_chat(request.clone()).await.unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments, vec!["a", "b"]);

        assert!(backend.stream_chat(request.clone()).await.is_err());
        assert!(backend.stream_chat(request).await.is_err());
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_error_after_fragments() {
        let backend = MockChatBackend::new().add_reply(MockReply::stream_error(&["partial"], "reset"));
        let stream = backend
            .stream_chat(ChatRequest {
                messages: Vec::new(),
                context: String::new(),
            })
            .await
            .unwrap();

        let items: Vec<SessionResult<String>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(SessionError::Stream(_))));
    }

    #[tokio::test]
    async fn test_generator_captures_requests() {
        let generator = MockGenerator::new().add_response(MockGeneration::Http {
            status: 500,
            body: "boom".to_string(),
        });
        let result = generator
            .generate(GenerateRequest {
                prompt: "todo".to_string(),
                existing_files: None,
                confirmed: true,
            })
            .await;

        assert!(matches!(result, Err(SessionError::Http { status: 500, .. })));
        assert_eq!(generator.requests()[0].prompt, "todo");
    }
}
