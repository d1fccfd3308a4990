//! Engine Configuration
//!
//! Runtime settings loaded from `engine.toml`. Every field has a default so a
//! missing file or a partial file is valid.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::QuestError;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub agents: AgentSettings,
    pub events: EventSettings,
    pub logging: LogSettings,
}

/// Agent pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Upper bound for a single agent script evaluation, 0 disables it
    pub timeout_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

/// Lifecycle notification settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Buffer size of the broadcast channel carrying Post notifications
    pub channel_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { channel_capacity: 64 }
    }
}

/// Logging settings used by the binary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default `tracing` directive, extended by `RUST_LOG`
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "quest_engine=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, QuestError> {
        toml::from_str(content).map_err(|e| QuestError::Config(e.to_string()))
    }

    /// Load configuration from a file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, QuestError> {
        if !path.exists() {
            warn!("Engine config {:?} does not exist, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| QuestError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config = Self::from_toml_str(&content)?;

        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Per-agent evaluation timeout, `None` when disabled
    pub fn agent_timeout(&self) -> Option<Duration> {
        match self.agents.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Broadcast capacity, never zero
    pub fn channel_capacity(&self) -> usize {
        self.events.channel_capacity.max(1)
    }
}
