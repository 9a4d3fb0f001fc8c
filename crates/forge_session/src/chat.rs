//! Chat driver: streams a reply into the trailing assistant turn and
//! classifies it once the stream ends.

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::ChatRequest;
use crate::classify::{self, ReplyKind, POLICY_REFUSAL};
use crate::error::SessionError;
use crate::session::{BuildSession, RequestKind};
use crate::types::{ChatMessage, Phase, ProposedAction, Turn};

impl BuildSession {
    /// Start streaming a reply in the background.
    ///
    /// The user turn is recorded before this returns. Returns `None` (and
    /// changes nothing) when a request is already in flight or the prompt is
    /// blank.
    pub fn start_chat(
        &self,
        prompt: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Option<JoinHandle<()>> {
        let (id, cancel, request) = self.begin_chat(prompt, context, history)?;
        let session = self.clone();
        Some(tokio::spawn(async move {
            session.drive_chat(id, cancel, request).await;
        }))
    }

    /// Stream a reply on the current task. Returns whether a chat ran.
    pub async fn chat(&self, prompt: &str, context: &str, history: &[ChatMessage]) -> bool {
        match self.begin_chat(prompt, context, history) {
            Some((id, cancel, request)) => {
                self.drive_chat(id, cancel, request).await;
                true
            }
            None => false,
        }
    }

    fn begin_chat(
        &self,
        prompt: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Option<(u64, CancellationToken, ChatRequest)> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            debug!("Ignoring blank prompt");
            return None;
        }

        let started = self.try_update(|s| {
            if s.active.is_some() {
                return None;
            }
            s.transcript.push(Turn::user(prompt));
            s.push_assistant(Turn::assistant(""));
            let started = s.begin(RequestKind::Chat);
            s.phase = Phase::Chatting;
            Some(started)
        });
        let Some((id, cancel)) = started else {
            debug!("Chat ignored: a request is already in flight");
            return None;
        };

        let window = self.inner.config.history_window;
        let skip = history.len().saturating_sub(window);
        let mut messages = history[skip..].to_vec();
        messages.push(ChatMessage::user(prompt));

        info!("Chat {} started with {} messages", id, messages.len());
        Some((
            id,
            cancel,
            ChatRequest {
                messages,
                context: context.to_string(),
            },
        ))
    }

    async fn drive_chat(&self, id: u64, cancel: CancellationToken, request: ChatRequest) {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.inner.chat.stream_chat(request) => Some(result),
        };
        let mut stream = match opened {
            None => {
                debug!("Chat {} cancelled before the stream opened", id);
                return;
            }
            Some(Err(e)) => {
                self.fail_chat(id, e);
                return;
            }
            Some(Ok(stream)) => stream,
        };

        let mut buffer = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Chat {} cancelled mid-stream", id);
                    return;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    buffer.push_str(&fragment);
                    let visible = classify::streaming_text(&buffer);
                    self.update_if_current(id, |s| {
                        if let Some(turn) = s.trailing_assistant_mut() {
                            turn.text = visible;
                        }
                    });
                }
                Some(Err(e)) => {
                    self.fail_chat(id, e);
                    return;
                }
                None => break,
            }
        }

        if buffer.trim().is_empty() {
            self.fail_chat(id, SessionError::Stream("the assistant returned an empty reply".to_string()));
            return;
        }
        self.finish_chat(id, &buffer);
    }

    fn finish_chat(&self, id: u64, buffer: &str) {
        let reply = classify::classify_reply(buffer);
        let kind = reply.kind;

        self.update_if_current(id, move |s| {
            if let Some(turn) = s.trailing_assistant_mut() {
                match kind {
                    ReplyKind::Reply => {
                        turn.text = reply.visible;
                    }
                    ReplyKind::PlanProposal => {
                        turn.text = reply.visible;
                        turn.build_directive = reply.directive;
                        turn.proposed_action = Some(ProposedAction::AwaitingConfirmation);
                    }
                    ReplyKind::PolicyViolation => {
                        turn.text = POLICY_REFUSAL.to_string();
                        turn.proposed_action = Some(ProposedAction::ErrorReport);
                    }
                }
            }

            if kind == ReplyKind::PolicyViolation {
                s.last_error = Some("Reply tried to build without presenting a plan".to_string());
                s.finish(Phase::Error);
            } else {
                s.finish(Phase::Idle);
            }
        });

        match kind {
            ReplyKind::Reply => info!("Chat {} finished", id),
            ReplyKind::PlanProposal => info!("Chat {} proposed a plan", id),
            ReplyKind::PolicyViolation => {
                warn!("Chat {} emitted a build directive without a plan", id)
            }
        }
    }

    fn fail_chat(&self, id: u64, error: SessionError) {
        warn!("Chat {} failed: {}", id, error);
        let message = error.to_string();
        let apology = format!("Sorry, something went wrong: {}", message);

        self.update_if_current(id, move |s| {
            if let Some(turn) = s.trailing_assistant_mut() {
                if turn.text.is_empty() {
                    turn.text = apology;
                }
            }
            s.last_error = Some(message);
            s.finish(Phase::Error);
        });
    }
}
