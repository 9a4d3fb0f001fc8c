//! # forge_session
//!
//! Coordinator for a conversational project builder.
//!
//! A [`BuildSession`] owns one interaction lifecycle:
//! - **Chat**: stream an assistant reply and decide whether it proposes a plan
//! - **Confirm**: nothing is built until the user confirms the proposed plan
//! - **Build**: send the plan to the generation endpoint while a step list
//!   and a progress bar move forward
//! - **Consume**: hand the generated artifacts to the host exactly once
//!
//! Any number of observers can subscribe and read a fresh snapshot after
//! every change. `abort` and `reset` are synchronous and always win over a
//! request still in flight.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌─────────────────┐
//!   prompt ──────▶ │   BuildSession  │ ──────▶ observers
//!                  └────────┬────────┘
//!            ┌──────────────┴──────────────┐
//!            ▼                             ▼
//!   ┌─────────────────┐          ┌─────────────────┐
//!   │   Chat driver   │          │  Build driver   │
//!   │ SSE + classify  │          │ steps + ticker  │
//!   └────────┬────────┘          └────────┬────────┘
//!            ▼                             ▼
//!   ┌─────────────────┐          ┌─────────────────┐
//!   │   ChatBackend   │          │ProjectGenerator │
//!   └─────────────────┘          └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use forge_session::{BuildSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = BuildSession::from_config(SessionConfig::from_env()?);
//!     let _watch = session.subscribe(|| {});
//!
//!     session.chat("Build me a recipe site", "", &[]).await;
//!     if let Some(proposal) = session.pending_proposal() {
//!         if let Some(build) = session.confirm_and_build(&proposal.id, None) {
//!             build.await?;
//!         }
//!     }
//!     if let Some(files) = session.consume_results() {
//!         forge_session::export::write_artifacts("out", &files)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod broadcast;
mod build;
mod chat;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod http;
pub mod mock;
pub mod progress;
pub mod session;
pub mod sse;
pub mod types;

pub use backend::{ChatBackend, ChatRequest, GenerateRequest, GenerateResponse, ProjectGenerator};
pub use broadcast::{Broadcaster, Subscription};
pub use classify::{ClassifiedReply, ReplyKind};
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use http::{HttpChatBackend, HttpProjectGenerator};
pub use mock::{MockChatBackend, MockGeneration, MockGenerator, MockReply};
pub use session::BuildSession;
pub use sse::TextStream;
pub use types::{
    Artifact, BuildStep, ChatMessage, Confirmation, Phase, ProposedAction, SessionId,
    SessionSnapshot, Speaker, StepStatus, Turn,
};
