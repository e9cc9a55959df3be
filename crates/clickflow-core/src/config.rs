use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ClickflowError, Result};

/// Top-level configuration for the Clickflow application.
///
/// Loaded from `~/.clickflow/config.toml` by default. Each section corresponds
/// to one subsystem. Scenarios and Telegram credentials are user data and live
/// in the key-value store, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClickflowConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl ClickflowConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClickflowConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ClickflowError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite store and screenshots.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.clickflow/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GeneralConfig {
    pub fn data_path(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    /// Directory where screenshot actions write auto-named captures.
    pub fn screenshots_path(&self) -> PathBuf {
        self.data_path().join("screenshots")
    }
}

/// Execution engine timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inter-action delay given to newly created scenarios.
    pub default_action_delay_ms: u64,
    /// Pause between repeats when the scenario's action delay is zero.
    pub repeat_delay_ms: u64,
    /// Pause between passes of a loop-forever scenario.
    pub loop_delay_ms: u64,
    /// Pause before re-triggering a Telegram scenario with the next queued message.
    pub retrigger_delay_ms: u64,
    /// Default pause between points of a multi-coordinate action.
    pub coordinate_delay_ms: u64,
    /// Poll interval for clipboard and pixel waits.
    pub wait_poll_interval_ms: u64,
    /// Whether the automation master switch starts enabled.
    pub start_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_action_delay_ms: 500,
            repeat_delay_ms: 1000,
            loop_delay_ms: 1000,
            retrigger_delay_ms: 500,
            coordinate_delay_ms: 200,
            wait_poll_interval_ms: 100,
            start_enabled: false,
        }
    }
}

/// Telegram polling behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API base URL. The token is appended as `/bot<token>/<method>`.
    pub api_base_url: String,
    /// Interval between `getUpdates` polls.
    pub poll_interval_secs: u64,
    /// Long-poll timeout passed to `getUpdates`.
    pub long_poll_timeout_secs: u64,
    /// Maximum updates fetched per poll.
    pub update_limit: u32,
    /// Number of inbound messages kept in history.
    pub history_limit: usize,
    /// HTTP request timeout; must exceed the long-poll timeout.
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.telegram.org".to_string(),
            poll_interval_secs: 5,
            long_poll_timeout_secs: 30,
            update_limit: 100,
            history_limit: 100,
            request_timeout_secs: 40,
        }
    }
}

/// Coordinate recorder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Clicks within this many pixels of the previous capture (on both axes)
    /// are ignored.
    pub dedup_threshold_px: u32,
    /// Minimize the host window while recording.
    pub minimize_on_start: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dedup_threshold_px: 10,
            minimize_on_start: true,
        }
    }
}
