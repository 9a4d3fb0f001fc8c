//! Collaborator seams.
//!
//! The session never talks HTTP directly. It drives a [`ChatBackend`] for
//! streamed replies and a [`ProjectGenerator`] for builds; `http.rs` has the
//! network implementations and `mock.rs` the scripted ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;
use crate::sse::TextStream;
use crate::types::{Artifact, ChatMessage};

/// Body of a chat request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// History window followed by the new prompt
    pub messages: Vec<ChatMessage>,
    /// Free-form project context supplied by the host
    pub context: String,
}

/// Body of a project generation request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(rename = "existingFiles", skip_serializing_if = "Option::is_none")]
    pub existing_files: Option<Vec<Artifact>>,
    pub confirmed: bool,
}

/// Body of a project generation response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateResponse {
    #[serde(default)]
    pub files: Vec<Artifact>,
}

/// Text-generation endpoint that streams its reply
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streamed reply. Errors here mean the request never produced a
    /// stream (network failure, non-success status).
    async fn stream_chat(&self, request: ChatRequest) -> SessionResult<TextStream>;
}

/// Project-generation endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectGenerator: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> SessionResult<GenerateResponse>;
}
