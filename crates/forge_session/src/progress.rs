//! Build milestones and the synthetic progress ticker.
//!
//! The ticker is cosmetic: the generation endpoint reports nothing until it
//! returns, so the bar creeps forward on a timer and jumps at milestones.

use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::types::{BuildStep, StepStatus};

/// Fixed build milestones, in order: (name, label, progress once done)
pub const BUILD_STEPS: [(&str, &str, u8); 5] = [
    ("analysis", "Analyzing requirements", 15),
    ("structure", "Generating project structure", 35),
    ("styling", "Applying styles", 55),
    ("logic", "Implementing logic", 75),
    ("assembly", "Assembling files", 90),
];

/// Highest value the ticker may reach; only a finished build shows 100.
pub const MAX_TICKER_CEILING: u8 = 99;

/// Shortest ticker period.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Fresh step list with the first milestone active
pub fn initial_steps() -> Vec<BuildStep> {
    BUILD_STEPS
        .iter()
        .enumerate()
        .map(|(i, (name, label, _))| BuildStep {
            name: name.to_string(),
            label: label.to_string(),
            status: if i == 0 {
                StepStatus::Active
            } else {
                StepStatus::Pending
            },
        })
        .collect()
}

/// Progress reached once the step at `index` is done
pub fn milestone_progress(index: usize) -> u8 {
    BUILD_STEPS.get(index).map_or(0, |(_, _, p)| *p)
}

/// Next progress value for a ticker increment. Never decreases and never
/// exceeds `ceiling` on its own.
pub fn next_progress(current: u8, increment: u8, ceiling: u8) -> u8 {
    current.max(current.saturating_add(increment).min(ceiling))
}

/// Mark the step at `index` done and activate the following one.
pub fn advance_steps(steps: &mut [BuildStep], index: usize) {
    if let Some(step) = steps.get_mut(index) {
        step.status = StepStatus::Done;
    }
    if let Some(next) = steps.get_mut(index + 1) {
        if next.status == StepStatus::Pending {
            next.status = StepStatus::Active;
        }
    }
}

/// Mark every step done.
pub fn complete_steps(steps: &mut [BuildStep]) {
    for step in steps {
        step.status = StepStatus::Done;
    }
}

/// Return an interrupted build's active step to pending.
pub fn halt_steps(steps: &mut [BuildStep]) {
    for step in steps.iter_mut().filter(|s| s.status == StepStatus::Active) {
        step.status = StepStatus::Pending;
    }
}

/// Mark the active step (or the first unfinished one) as failed.
pub fn fail_steps(steps: &mut [BuildStep]) {
    let target = steps
        .iter()
        .position(|s| s.status == StepStatus::Active)
        .or_else(|| steps.iter().position(|s| s.status != StepStatus::Done));
    if let Some(i) = target {
        steps[i].status = StepStatus::Error;
    }
}

/// Ticker settings
#[derive(Debug, Clone, Copy)]
pub struct TickerConfig {
    pub interval: Duration,
    pub max_increment: u8,
}

/// Spawn a ticker calling `on_tick` with a random increment in
/// `1..=max_increment` every interval until `stop` is cancelled.
pub fn spawn_ticker<F>(config: TickerConfig, stop: CancellationToken, on_tick: F) -> JoinHandle<()>
where
    F: Fn(u8) + Send + 'static,
{
    tokio::spawn(async move {
        let period = config.interval.max(MIN_TICK_INTERVAL);
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = interval.tick() => {
                    let increment = rand::thread_rng().gen_range(1..=config.max_increment.max(1));
                    on_tick(increment);
                }
            }
        }
    })
}
