//! Build session coordinator.
//!
//! [`BuildSession`] is a cheap clonable handle. The host constructs one at
//! startup and passes it to everything that drives or observes the chat and
//! build flow. The chat driver lives in `chat.rs`, the build driver in
//! `build.rs`; this module owns the state and the operations that are not
//! tied to a request.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{ChatBackend, ProjectGenerator};
use crate::broadcast::{Broadcaster, Subscription};
use crate::config::SessionConfig;
use crate::http::{HttpChatBackend, HttpProjectGenerator};
use crate::progress;
use crate::types::{
    Artifact, BuildStep, ChatMessage, Confirmation, Phase, SessionId, SessionSnapshot, Speaker,
    Turn,
};

/// Kind of the request currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Chat,
    Build,
}

pub(crate) struct ActiveRequest {
    pub(crate) id: u64,
    pub(crate) kind: RequestKind,
    pub(crate) cancel: CancellationToken,
}

pub(crate) struct SessionState {
    pub(crate) session_id: SessionId,
    pub(crate) phase: Phase,
    pub(crate) progress: u8,
    pub(crate) transcript: Vec<Turn>,
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) last_error: Option<String>,
    pub(crate) active: Option<ActiveRequest>,
    next_request_id: u64,
}

impl SessionState {
    fn new(next_request_id: u64) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            phase: Phase::Idle,
            progress: 0,
            transcript: Vec::new(),
            artifacts: Vec::new(),
            last_error: None,
            active: None,
            next_request_id,
        }
    }

    /// Register a new active request. Callers check `active` first.
    pub(crate) fn begin(&mut self, kind: RequestKind) -> (u64, CancellationToken) {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let cancel = CancellationToken::new();
        self.active = Some(ActiveRequest {
            id,
            kind,
            cancel: cancel.clone(),
        });
        self.last_error = None;
        self.progress = 0;
        (id, cancel)
    }

    /// Drop the active request and enter `phase`.
    pub(crate) fn finish(&mut self, phase: Phase) {
        self.active = None;
        self.phase = phase;
        if phase != Phase::Done {
            self.progress = 0;
        }
    }

    pub(crate) fn is_current(&self, id: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Append an assistant turn; only the newest assistant turn may carry a
    /// proposed action.
    pub(crate) fn push_assistant(&mut self, turn: Turn) {
        for earlier in &mut self.transcript {
            earlier.proposed_action = None;
        }
        self.transcript.push(turn);
    }

    pub(crate) fn trailing_assistant_mut(&mut self) -> Option<&mut Turn> {
        self.transcript
            .iter_mut()
            .rev()
            .find(|t| t.speaker == Speaker::Assistant)
    }

    /// Step list of the most recent build turn
    pub(crate) fn build_steps_mut(&mut self) -> Option<&mut Vec<BuildStep>> {
        self.transcript
            .iter_mut()
            .rev()
            .find_map(|t| t.step_list.as_mut())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase,
            progress: self.progress,
            transcript: self.transcript.clone(),
            artifacts: self.artifacts.clone(),
            last_error: self.last_error.clone(),
            busy: self.active.is_some(),
        }
    }
}

pub(crate) struct SessionInner {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) observers: Broadcaster,
    pub(crate) chat: Arc<dyn ChatBackend>,
    pub(crate) generator: Arc<dyn ProjectGenerator>,
    pub(crate) config: SessionConfig,
}

/// Coordinator for one chat + build interaction lifecycle
#[derive(Clone)]
pub struct BuildSession {
    pub(crate) inner: Arc<SessionInner>,
}

impl BuildSession {
    /// Create a session over explicit collaborators
    pub fn new(
        config: SessionConfig,
        chat: Arc<dyn ChatBackend>,
        generator: Arc<dyn ProjectGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState::new(1)),
                observers: Broadcaster::new(),
                chat,
                generator,
                config,
            }),
        }
    }

    /// Create a session talking to the configured HTTP endpoints
    pub fn from_config(config: SessionConfig) -> Self {
        let chat = Arc::new(HttpChatBackend::from_config(&config));
        let generator = Arc::new(HttpProjectGenerator::from_config(&config));
        Self::new(config, chat, generator)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Register an observer called after every state change
    pub fn subscribe(&self, observer: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.observers.subscribe(observer)
    }

    /// Full copy of the current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.state.lock().session_id.clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub fn progress(&self) -> u8 {
        self.inner.state.lock().progress
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.inner.state.lock().transcript.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    /// Whether a chat or build request is in flight
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().active.is_some()
    }

    /// Transcript as chat history, for follow-up prompts
    pub fn history(&self) -> Vec<ChatMessage> {
        self.inner
            .state
            .lock()
            .transcript
            .iter()
            .filter(|t| !t.text.is_empty())
            .map(ChatMessage::from)
            .collect()
    }

    /// Mutate state, then notify observers.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let result = {
            let mut state = self.inner.state.lock();
            f(&mut state)
        };
        self.inner.observers.notify();
        result
    }

    /// Mutate state and notify only when `f` reports a change.
    pub(crate) fn try_update<R>(&self, f: impl FnOnce(&mut SessionState) -> Option<R>) -> Option<R> {
        let result = {
            let mut state = self.inner.state.lock();
            f(&mut state)
        };
        if result.is_some() {
            self.inner.observers.notify();
        }
        result
    }

    /// Mutate state on behalf of request `id`, if it is still the active
    /// one. Driver tasks that outlived an abort or reset are ignored here.
    pub(crate) fn update_if_current<R>(
        &self,
        id: u64,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Option<R> {
        self.try_update(|state| state.is_current(id).then(|| f(state)))
    }

    /// Cancel the in-flight request, if any, and return to idle.
    ///
    /// Synchronous and idempotent. Generated artifacts that were not
    /// consumed yet are kept.
    pub fn abort(&self) {
        let aborted = self.update(|s| {
            let active = s.active.take();
            if let Some(request) = &active {
                request.cancel.cancel();
                if request.kind == RequestKind::Chat {
                    let empty_placeholder = s
                        .transcript
                        .last()
                        .is_some_and(|t| t.speaker == Speaker::Assistant && t.text.is_empty());
                    if empty_placeholder {
                        s.transcript.pop();
                    }
                } else if let Some(steps) = s.build_steps_mut() {
                    progress::halt_steps(steps);
                }
            }
            s.phase = Phase::Idle;
            s.progress = 0;
            s.last_error = None;
            active.map(|a| (a.id, a.kind))
        });

        match aborted {
            Some((id, kind)) => info!("Aborted {:?} request {}", kind, id),
            None => debug!("Abort with no request in flight"),
        }
    }

    /// Abort and start over with an empty transcript and a new session id
    pub fn reset(&self) {
        let session_id = self.update(|s| {
            if let Some(request) = s.active.take() {
                request.cancel.cancel();
            }
            *s = SessionState::new(s.next_request_id);
            s.session_id.clone()
        });
        info!("Session reset, new session {}", session_id);
    }

    /// Claim the generated artifacts. Returns them once, then `None`.
    pub fn consume_results(&self) -> Option<Vec<Artifact>> {
        let files = self.try_update(|s| {
            if s.artifacts.is_empty() {
                return None;
            }
            let files = std::mem::take(&mut s.artifacts);
            if s.active.is_none() {
                s.phase = Phase::Idle;
                s.progress = 0;
            }
            Some(files)
        })?;
        info!("Consumed {} artifacts", files.len());
        Some(files)
    }

    /// Clear a surfaced error without starting a new request
    pub fn acknowledge_error(&self) {
        self.try_update(|s| {
            if s.phase != Phase::Error || s.active.is_some() {
                return None;
            }
            s.phase = Phase::Idle;
            s.last_error = None;
            Some(())
        });
    }

    /// The newest assistant turn, if it is waiting for confirmation
    pub fn pending_proposal(&self) -> Option<Turn> {
        self.inner
            .state
            .lock()
            .transcript
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::Assistant)
            .filter(|t| t.is_awaiting_confirmation())
            .cloned()
    }

    fn answer_proposal(&self, turn_id: &str, answer: Confirmation) -> Option<String> {
        self.try_update(|s| {
            let turn = s.trailing_assistant_mut()?;
            if turn.id != turn_id || !turn.is_awaiting_confirmation() {
                return None;
            }
            turn.proposed_action = None;
            turn.confirmation = Some(answer);
            Some(turn.plan_text().to_string())
        })
    }

    /// Confirm a proposed plan, returning the text to build from
    pub fn confirm_proposal(&self, turn_id: &str) -> Option<String> {
        let plan = self.answer_proposal(turn_id, Confirmation::Confirmed);
        if plan.is_some() {
            info!("Plan {} confirmed", turn_id);
        }
        plan
    }

    /// Reject a proposed plan
    pub fn reject_proposal(&self, turn_id: &str) -> bool {
        let rejected = self.answer_proposal(turn_id, Confirmation::Rejected).is_some();
        if rejected {
            info!("Plan {} rejected", turn_id);
        }
        rejected
    }

    /// Confirm a proposed plan and start building it
    pub fn confirm_and_build(
        &self,
        turn_id: &str,
        existing_files: Option<Vec<Artifact>>,
    ) -> Option<JoinHandle<()>> {
        let plan = self.confirm_proposal(turn_id)?;
        self.execute_build(&plan, existing_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerateResponse, MockProjectGenerator};
    use crate::mock::{MockChatBackend, MockReply};
    use crate::types::{ProposedAction, StepStatus};

    fn session_with(chat: MockChatBackend, generator: MockProjectGenerator) -> BuildSession {
        BuildSession::new(
            SessionConfig::default().without_pacing(),
            Arc::new(chat),
            Arc::new(generator),
        )
    }

    #[tokio::test]
    async fn test_policy_violation_never_reaches_generator() {
        let chat = MockChatBackend::new().add_reply(MockReply::text(&[
            "Sure, starting now. ",
            "<BUILD_PROJECT>todo app</BUILD_PROJECT>",
        ]));
        let mut generator = MockProjectGenerator::new();
        generator.expect_generate().never();
        let session = session_with(chat, generator);

        assert!(session.chat("Build a todo app", "", &[]).await);

        let turn = session.transcript().pop().unwrap();
        assert_eq!(turn.proposed_action, Some(ProposedAction::ErrorReport));
        assert_eq!(turn.text, crate::classify::POLICY_REFUSAL);
        assert_eq!(session.phase(), Phase::Error);
        assert!(session.pending_proposal().is_none());
        assert!(session.confirm_proposal(&turn.id).is_none());
    }

    #[tokio::test]
    async fn test_confirmed_directive_is_sent_as_prompt() {
        let chat = MockChatBackend::new().add_reply(MockReply::text(&[
            "🚀 **Project: Portfolio**\nA one page portfolio.\n",
            "<BUILD_PROJECT>portfolio with dark theme</BUILD_PROJECT>",
        ]));
        let mut generator = MockProjectGenerator::new();
        generator
            .expect_generate()
            .withf(|req| {
                req.prompt == "portfolio with dark theme"
                    && req.confirmed
                    && req.existing_files.is_none()
            })
            .times(1)
            .returning(|_| {
                Ok(GenerateResponse {
                    files: vec![Artifact::new("index.html", "html", "<html></html>")],
                })
            });
        let session = session_with(chat, generator);

        session.chat("Make me a portfolio", "", &[]).await;
        let proposal = session.pending_proposal().unwrap();
        assert!(!proposal.text.contains("BUILD_PROJECT"));

        let handle = session.confirm_and_build(&proposal.id, None).unwrap();
        handle.await.unwrap();

        assert_eq!(session.phase(), Phase::Done);
        assert_eq!(session.progress(), 100);
        let confirmed = session
            .transcript()
            .into_iter()
            .find(|t| t.id == proposal.id)
            .unwrap();
        assert_eq!(confirmed.confirmation, Some(Confirmation::Confirmed));
        assert!(confirmed.proposed_action.is_none());
    }

    #[tokio::test]
    async fn test_existing_files_only_sent_for_modifications() {
        let mut generator = MockProjectGenerator::new();
        generator
            .expect_generate()
            .withf(|req| req.existing_files.as_ref().map(Vec::len) == Some(1))
            .times(1)
            .returning(|req| {
                Ok(GenerateResponse {
                    files: req.existing_files.unwrap_or_default(),
                })
            });
        generator
            .expect_generate()
            .withf(|req| req.existing_files.is_none())
            .times(1)
            .returning(|_| {
                Ok(GenerateResponse {
                    files: vec![Artifact::new("app.js", "javascript", "")],
                })
            });
        let session = session_with(MockChatBackend::new(), generator);
        let existing = vec![Artifact::new("index.html", "html", "<h1>Hi</h1>")];

        assert!(
            session
                .build("Update the header to say hello", Some(existing.clone()))
                .await
        );
        assert_eq!(session.consume_results().unwrap().len(), 1);

        assert!(session.build("A bakery landing page", Some(existing)).await);
        assert_eq!(session.consume_results().unwrap()[0].name, "app.js");
    }

    #[tokio::test]
    async fn test_reject_stamps_turn() {
        let chat = MockChatBackend::new().add_reply(MockReply::text(&[
            "**Here's my plan:**\n1. Header\n2. Footer\nShall I proceed?",
        ]));
        let session = session_with(chat, MockProjectGenerator::new());

        session.chat("Landing page", "", &[]).await;
        let proposal = session.pending_proposal().unwrap();
        assert!(session.reject_proposal(&proposal.id));
        assert!(!session.reject_proposal(&proposal.id));

        let turn = session.transcript().pop().unwrap();
        assert_eq!(turn.confirmation, Some(Confirmation::Rejected));
        assert!(turn.proposed_action.is_none());
        assert!(session.pending_proposal().is_none());
    }

    #[tokio::test]
    async fn test_empty_generation_is_failure() {
        let mut generator = MockProjectGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Ok(GenerateResponse { files: Vec::new() }));
        let session = session_with(MockChatBackend::new(), generator);

        session.build("A todo app", None).await;

        assert_eq!(session.phase(), Phase::Error);
        assert_eq!(session.progress(), 0);
        assert!(session.consume_results().is_none());
        let steps = session
            .transcript()
            .into_iter()
            .find_map(|t| t.step_list)
            .unwrap();
        assert!(steps.iter().any(|s| s.status == StepStatus::Error));
        assert!(session.last_error().unwrap().contains("no files"));
    }

    #[test]
    fn test_acknowledge_error_only_from_error() {
        let session = session_with(MockChatBackend::new(), MockProjectGenerator::new());
        session.acknowledge_error();
        assert_eq!(session.phase(), Phase::Idle);

        session.update(|s| {
            s.phase = Phase::Error;
            s.last_error = Some("boom".to_string());
        });
        session.acknowledge_error();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_stale_request_cannot_mutate() {
        let session = session_with(MockChatBackend::new(), MockProjectGenerator::new());
        let id = session.update(|s| s.begin(RequestKind::Build).0);
        session.abort();

        let applied = session.update_if_current(id, |s| s.progress = 50);
        assert!(applied.is_none());
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let session = session_with(MockChatBackend::new(), MockProjectGenerator::new());
        let old_id = session.session_id();
        session.update(|s| {
            s.transcript.push(Turn::user("hello"));
            s.artifacts.push(Artifact::new("a.txt", "text", "a"));
            s.phase = Phase::Done;
        });

        session.reset();

        let snapshot = session.snapshot();
        assert_ne!(snapshot.session_id, old_id);
        assert!(snapshot.transcript.is_empty());
        assert!(snapshot.artifacts.is_empty());
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(!snapshot.busy);
    }
}
