//! Build driver: sends a confirmed plan to the generation endpoint while
//! walking the milestone list and the progress ticker forward.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::GenerateRequest;
use crate::classify;
use crate::error::{SessionError, SessionResult};
use crate::progress::{self, TickerConfig, BUILD_STEPS};
use crate::session::{BuildSession, RequestKind};
use crate::types::{Artifact, Phase, Turn};

const CONFIRMATION_TEXT: &str = "✅ Confirmed. Go ahead and build it.";
const BUILDING_TEXT: &str = "🔨 Building your project...";

impl BuildSession {
    /// Start a build in the background.
    ///
    /// `existing_files` are only sent when the plan reads as a change to an
    /// existing project. Returns `None` (and changes nothing) when a request
    /// is already in flight or the plan is blank.
    pub fn execute_build(
        &self,
        plan_text: &str,
        existing_files: Option<Vec<Artifact>>,
    ) -> Option<JoinHandle<()>> {
        let (id, cancel, request) = self.begin_build(plan_text, existing_files)?;
        let session = self.clone();
        Some(tokio::spawn(async move {
            session.drive_build(id, cancel, request).await;
        }))
    }

    /// Run a build on the current task. Returns whether a build ran.
    pub async fn build(&self, plan_text: &str, existing_files: Option<Vec<Artifact>>) -> bool {
        match self.begin_build(plan_text, existing_files) {
            Some((id, cancel, request)) => {
                self.drive_build(id, cancel, request).await;
                true
            }
            None => false,
        }
    }

    fn begin_build(
        &self,
        plan_text: &str,
        existing_files: Option<Vec<Artifact>>,
    ) -> Option<(u64, CancellationToken, GenerateRequest)> {
        let plan = plan_text.trim();
        if plan.is_empty() {
            debug!("Ignoring blank plan");
            return None;
        }

        let started = self.try_update(|s| {
            if s.active.is_some() {
                return None;
            }
            s.transcript.push(Turn::user(CONFIRMATION_TEXT));
            s.push_assistant(Turn::assistant(BUILDING_TEXT).with_steps(progress::initial_steps()));
            let started = s.begin(RequestKind::Build);
            s.phase = Phase::Building;
            Some(started)
        });
        let Some((id, cancel)) = started else {
            debug!("Build ignored: a request is already in flight");
            return None;
        };

        let existing_files = existing_files
            .filter(|files| !files.is_empty() && classify::is_modification_request(plan));

        info!(
            "Build {} started ({})",
            id,
            if existing_files.is_some() {
                "modification"
            } else {
                "fresh build"
            }
        );
        Some((
            id,
            cancel,
            GenerateRequest {
                prompt: plan.to_string(),
                existing_files,
                confirmed: true,
            },
        ))
    }

    async fn drive_build(&self, id: u64, cancel: CancellationToken, request: GenerateRequest) {
        let config = &self.inner.config;

        // Cancelled with the request, and on every return from here.
        let ticker_stop = cancel.child_token();
        let _ticker_guard = ticker_stop.clone().drop_guard();
        let ceiling = config.ticker_ceiling.min(progress::MAX_TICKER_CEILING);
        let ticking = self.clone();
        let _ticker = progress::spawn_ticker(
            TickerConfig {
                interval: config.tick_interval(),
                max_increment: config.max_tick_increment,
            },
            ticker_stop,
            move |increment| ticking.bump_progress(id, increment, ceiling),
        );

        let pause = config.step_pause();
        let last_step = BUILD_STEPS.len() - 1;
        let mut step = 0;

        let generation = self.inner.generator.generate(request);
        tokio::pin!(generation);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Build {} cancelled", id);
                    return;
                }
                result = &mut generation => break result,
                _ = tokio::time::sleep(pause), if step < last_step => {
                    self.advance_step(id, step);
                    step += 1;
                }
            }
        };

        match result.and_then(require_files) {
            Ok(files) => self.complete_build(id, files),
            Err(e) => self.fail_build(id, e),
        }
    }

    fn bump_progress(&self, id: u64, increment: u8, ceiling: u8) {
        self.update_if_current(id, |s| {
            s.progress = progress::next_progress(s.progress, increment, ceiling);
        });
    }

    fn advance_step(&self, id: u64, index: usize) {
        self.update_if_current(id, |s| {
            if let Some(steps) = s.build_steps_mut() {
                progress::advance_steps(steps, index);
            }
            s.progress = s.progress.max(progress::milestone_progress(index));
        });
    }

    fn complete_build(&self, id: u64, files: Vec<Artifact>) {
        let listing = files
            .iter()
            .map(|f| format!("- {}", f.name))
            .collect::<Vec<_>>()
            .join("\n");
        let summary = format!(
            "🎉 Your project is ready! Generated {} file{}:\n{}",
            files.len(),
            if files.len() == 1 { "" } else { "s" },
            listing
        );
        let count = files.len();

        self.update_if_current(id, move |s| {
            if let Some(steps) = s.build_steps_mut() {
                progress::complete_steps(steps);
            }
            s.progress = 100;
            s.artifacts = files;
            s.push_assistant(Turn::assistant(summary));
            s.finish(Phase::Done);
        });
        info!("Build {} done with {} files", id, count);
    }

    fn fail_build(&self, id: u64, error: SessionError) {
        warn!("Build {} failed: {}", id, error);
        let message = error.to_string();
        let report = format!("❌ Build failed: {}", message);

        self.update_if_current(id, move |s| {
            if let Some(steps) = s.build_steps_mut() {
                progress::fail_steps(steps);
            }
            s.push_assistant(Turn::assistant(report));
            s.last_error = Some(message);
            s.finish(Phase::Error);
        });
    }
}

fn require_files(response: crate::backend::GenerateResponse) -> SessionResult<Vec<Artifact>> {
    if response.files.is_empty() {
        Err(SessionError::EmptyResult)
    } else {
        Ok(response.files)
    }
}
