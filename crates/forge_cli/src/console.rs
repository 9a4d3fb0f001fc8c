//! Terminal rendering of a running session.
//!
//! The session only says "something changed", so the console keeps what it
//! already printed and writes the difference: new reply text as it streams,
//! step transitions, and progress in 10% buckets.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use forge_session::{BuildSession, Phase, SessionSnapshot, StepStatus, Subscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Incremental renderer for session snapshots
#[derive(Debug, Default)]
pub struct Console {
    turn_id: Option<String>,
    printed: String,
    steps: Vec<StepStatus>,
    progress_shown: u8,
    line_open: bool,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write whatever changed since the previous snapshot.
    pub fn render(&mut self, snapshot: &SessionSnapshot, out: &mut impl Write) -> io::Result<()> {
        let Some(turn) = snapshot.trailing_assistant() else {
            return Ok(());
        };

        if self.turn_id.as_deref() != Some(turn.id.as_str()) {
            self.end_line(out)?;
            self.turn_id = Some(turn.id.clone());
            self.printed.clear();
            self.steps.clear();
            self.progress_shown = 0;
        }

        if turn.text != self.printed {
            match turn.text.strip_prefix(self.printed.as_str()) {
                Some(rest) => write!(out, "{}", rest)?,
                None => {
                    // Streamed text was rewritten (e.g. a refusal replaced it).
                    self.end_line(out)?;
                    write!(out, "{}", turn.text)?;
                }
            }
            self.printed = turn.text.clone();
            self.line_open = !self.printed.ends_with('\n');
        }

        if let Some(steps) = &turn.step_list {
            for (i, step) in steps.iter().enumerate() {
                if self.steps.get(i) == Some(&step.status) {
                    continue;
                }
                let marker = match step.status {
                    StepStatus::Pending => continue,
                    StepStatus::Active => "…",
                    StepStatus::Done => "✓",
                    StepStatus::Error => "✗",
                };
                self.end_line(out)?;
                writeln!(out, "  {} {}", marker, step.label)?;
            }
            self.steps = steps.iter().map(|s| s.status).collect();
        }

        if snapshot.phase == Phase::Building && snapshot.progress >= self.progress_shown + 10 {
            self.end_line(out)?;
            writeln!(out, "  [{:>3}%]", snapshot.progress)?;
            self.progress_shown = snapshot.progress - snapshot.progress % 10;
        }

        out.flush()
    }

    /// Close a partially written line.
    pub fn end_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.line_open {
            writeln!(out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

/// A console attached to a session, printing to stdout
pub struct LiveConsole {
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl LiveConsole {
    pub fn attach(session: &BuildSession) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        // Render the current state right away, then on every change.
        let _ = tx.send(());
        let subscription = session.subscribe(move || {
            let _ = tx.send(());
        });

        let watched = session.clone();
        let task = tokio::spawn(async move {
            let mut console = Console::new();
            while rx.recv().await.is_some() {
                // Coalesce bursts of notifications into one render.
                while rx.try_recv().is_ok() {}
                let snapshot = watched.snapshot();
                let mut stdout = io::stdout().lock();
                if let Err(e) = console.render(&snapshot, &mut stdout) {
                    debug!("Console write failed: {}", e);
                }
            }
            let _ = console.end_line(&mut io::stdout().lock());
        });

        Self { subscription, task }
    }

    /// Detach from the session once everything queued has been printed.
    pub async fn finish(self) {
        self.subscription.unsubscribe();
        if let Err(e) = self.task.await {
            warn!("Console task ended abnormally: {}", e);
        }
    }
}

/// Ctrl-C watcher that aborts the session's active request
pub struct Interrupt {
    triggered: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Interrupt {
    pub fn watch(session: &BuildSession) -> Self {
        let triggered = Arc::new(AtomicBool::new(false));
        let flag = triggered.clone();
        let session = session.clone();
        let task = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
                session.abort();
            }
        });
        Self { triggered, task }
    }

    pub fn triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.task.abort();
    }
}
