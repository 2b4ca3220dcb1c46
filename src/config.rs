//! Configuration loading and defaults for loginwatchd.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::tracker::DEBUG_IDLE_THRESHOLD_SECS;
use crate::tracker::DEFAULT_IDLE_THRESHOLD_SECS;

/// How events are printed to stdout.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One `[LOGIN]`/`[ACTIVE]` line per event (default).
    #[default]
    Text,
    /// One JSON object per poll that had events.
    Json,
}

/// Main configuration for loginwatchd.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between polls of the session table (default: 1).
    pub poll_interval_seconds: u64,

    /// Idle seconds a user must reach before a drop in idle counts as
    /// waking up (default: 3600, or 10 in debug builds).
    pub idle_threshold_seconds: u64,

    /// Directory holding the terminal devices named in the session table.
    pub device_dir: PathBuf,

    /// Output format for printed events.
    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 1,
            idle_threshold_seconds: default_idle_threshold(),
            device_dir: PathBuf::from("/dev"),
            output: OutputFormat::default(),
        }
    }
}

fn default_idle_threshold() -> u64 {
    if cfg!(debug_assertions) {
        DEBUG_IDLE_THRESHOLD_SECS
    } else {
        DEFAULT_IDLE_THRESHOLD_SECS
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("loginwatchd").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            anyhow::bail!("poll_interval_seconds must be at least 1");
        }
        Ok(())
    }
}
