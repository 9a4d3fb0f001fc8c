//! Session configuration.
//!
//! Settings are read from `<workspace>/.forge/settings.json` when it exists
//! and then overridden from the environment:
//!
//! - `FORGE_CHAT_URL`
//! - `FORGE_GENERATE_URL`
//! - `FORGE_API_TOKEN`
//! - `FORGE_STEP_PAUSE_MS`

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Configuration for a build session and its HTTP collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Streaming chat endpoint
    pub chat_url: String,
    /// Project generation endpoint
    pub generate_url: String,
    /// Bearer token sent to both endpoints
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Number of history entries sent with each prompt
    pub history_window: usize,
    /// Progress ticker period
    pub tick_interval_ms: u64,
    /// Upper bound of a single ticker increment
    pub max_tick_increment: u8,
    /// Progress the ticker never exceeds on its own
    pub ticker_ceiling: u8,
    /// Cosmetic pause between build milestones
    pub step_pause_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chat_url: "http://localhost:3000/api/chat".to_string(),
            generate_url: "http://localhost:3000/api/generate-project".to_string(),
            api_token: None,
            history_window: 10,
            tick_interval_ms: 500,
            max_tick_increment: 5,
            ticker_ceiling: 90,
            step_pause_ms: 800,
        }
    }
}

impl SessionConfig {
    /// Load settings for a workspace, then apply environment overrides
    pub fn from_settings(workspace_root: impl AsRef<Path>) -> SessionResult<Self> {
        let settings_path = workspace_root.as_ref().join(".forge").join("settings.json");

        let config = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).map_err(|e| {
                SessionError::Config(format!("{}: {}", settings_path.display(), e))
            })?
        } else {
            Self::default()
        };

        config.with_overrides(|key| std::env::var(key).ok())?.validated()
    }

    /// Defaults with environment overrides
    pub fn from_env() -> SessionResult<Self> {
        Self::default()
            .with_overrides(|key| std::env::var(key).ok())?
            .validated()
    }

    /// Apply overrides from a variable lookup. Empty values are ignored.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> SessionResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("FORGE_CHAT_URL") {
            self.chat_url = url;
        }
        if let Some(url) = get("FORGE_GENERATE_URL") {
            self.generate_url = url;
        }
        if let Some(token) = get("FORGE_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(pause) = get("FORGE_STEP_PAUSE_MS") {
            self.step_pause_ms = pause.trim().parse().map_err(|_| {
                SessionError::Config(format!("FORGE_STEP_PAUSE_MS is not a number: {}", pause))
            })?;
        }

        Ok(self)
    }

    /// Collapse cosmetic pacing, for hosts without a UI and for tests
    pub fn without_pacing(mut self) -> Self {
        self.step_pause_ms = 0;
        self.tick_interval_ms = 10;
        self
    }

    fn validated(self) -> SessionResult<Self> {
        if self.chat_url.trim().is_empty() || self.generate_url.trim().is_empty() {
            return Err(SessionError::Config("endpoint URLs must not be empty".to_string()));
        }
        if self.ticker_ceiling >= 100 {
            return Err(SessionError::Config(format!(
                "tickerCeiling must be below 100, got {}",
                self.ticker_ceiling
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(SessionError::Config("tickIntervalMs must be positive".to_string()));
        }
        Ok(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn step_pause(&self) -> Duration {
        Duration::from_millis(self.step_pause_ms)
    }
}
