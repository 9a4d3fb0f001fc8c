//! Core types for the build/chat session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a session
pub type SessionId = String;

/// Who said a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// Action an assistant turn is waiting on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProposedAction {
    /// A plan was proposed and needs a confirm/reject from the user
    AwaitingConfirmation,
    /// The reply was replaced with a refusal the user can retry from
    ErrorReport,
}

/// Outcome stamped on a turn once its proposal was answered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    Confirmed,
    Rejected,
}

/// State of a single build milestone
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Active,
    Done,
    Error,
}

/// A named milestone in a build turn's step list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildStep {
    /// Step identifier
    pub name: String,
    /// Display label
    pub label: String,
    /// Current status
    pub status: StepStatus,
}

/// One message in the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID (UUID)
    pub id: String,
    pub speaker: Speaker,
    /// Visible text, never contains a build directive region
    pub text: String,
    #[serde(rename = "proposedAction", skip_serializing_if = "Option::is_none")]
    pub proposed_action: Option<ProposedAction>,
    #[serde(rename = "stepList", skip_serializing_if = "Option::is_none")]
    pub step_list: Option<Vec<BuildStep>>,
    #[serde(rename = "confirmationState", skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
    /// Content of the `<BUILD_PROJECT>` region, when the reply carried one
    #[serde(rename = "buildDirective", skip_serializing_if = "Option::is_none")]
    pub build_directive: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(speaker: Speaker, text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            speaker,
            text,
            proposed_action: None,
            step_list: None,
            confirmation: None,
            build_directive: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text.into())
    }

    /// Create a new assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, text.into())
    }

    /// Attach a step list to this turn
    pub fn with_steps(mut self, steps: Vec<BuildStep>) -> Self {
        self.step_list = Some(steps);
        self
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.proposed_action == Some(ProposedAction::AwaitingConfirmation)
    }

    /// Text to hand to the build driver when this turn's plan is confirmed
    pub fn plan_text(&self) -> &str {
        self.build_directive.as_deref().unwrap_or(&self.text)
    }
}

/// A generated file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    /// Path relative to the project root
    pub name: String,
    /// Language tag (html, css, javascript, ...)
    pub language: String,
    pub content: String,
}

impl Artifact {
    pub fn new(
        name: impl Into<String>,
        language: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            content: content.into(),
        }
    }
}

/// A history entry as sent to the chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Speaker,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.speaker,
            content: turn.text.clone(),
        }
    }
}

/// Lifecycle phase of the session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No request in flight
    #[default]
    Idle,
    /// A reply is being streamed
    Chatting,
    /// A generation request is in flight
    Building,
    /// Artifacts are waiting to be consumed
    Done,
    /// The last operation failed; see `last_error`
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Chatting => "chatting",
            Self::Building => "building",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-describing copy of the session, for observers and transcript export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub phase: Phase,
    /// 0..=100
    pub progress: u8,
    pub transcript: Vec<Turn>,
    /// Artifacts not yet consumed
    pub artifacts: Vec<Artifact>,
    #[serde(rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether a chat or build request is in flight
    pub busy: bool,
}

impl SessionSnapshot {
    /// The most recent assistant turn, if any
    pub fn trailing_assistant(&self) -> Option<&Turn> {
        self.transcript
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::Assistant)
    }
}
