//! CLI argument definitions for the Clickflow binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use clickflow_core::types::ScenarioId;

/// Clickflow - scenario-driven desktop automation with Telegram triggers.
#[derive(Parser, Debug)]
#[command(name = "clickflow", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite store and screenshots.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all scenarios.
    List,
    /// Print a scenario as JSON.
    Show { id: ScenarioId },
    /// Create an empty scenario.
    New { name: String },
    /// Copy a scenario under a new id.
    Duplicate { id: ScenarioId },
    /// Delete a scenario. The last one cannot be deleted.
    Delete { id: ScenarioId },
    /// Run a scenario and wait for it to finish. Ctrl-C stops it.
    Run { id: ScenarioId },
    /// Stop whatever is running, then run this scenario.
    QuickRun { id: ScenarioId },
    /// Keep the engine and Telegram bridge alive until Ctrl-C.
    Daemon {
        /// Arm a Telegram-triggered scenario on startup.
        #[arg(long)]
        arm: Option<ScenarioId>,
    },
    /// Telegram bot settings and message history.
    Telegram {
        #[command(subcommand)]
        command: TelegramCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum TelegramCommand {
    /// Store bot credentials.
    Configure {
        #[arg(long)]
        token: String,
        /// Numeric chat id (negative for groups) or `@channel`.
        #[arg(long, allow_hyphen_values = true)]
        chat_id: String,
        #[arg(long)]
        bot_name: Option<String>,
    },
    /// Verify the token and chat with the Bot API.
    Test,
    /// Show received messages, newest first.
    Messages {
        /// Delete the history after printing it.
        #[arg(long)]
        clear: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CLICKFLOW_CONFIG env var > ~/.clickflow/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CLICKFLOW_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Priority: --log-level flag > RUST_LOG > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        std::env::var("RUST_LOG").unwrap_or_else(|_| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".clickflow").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".clickflow").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = CliArgs::try_parse_from(["clickflow", "run", "3"]).unwrap();
        assert!(matches!(args.command, Command::Run { id } if id == ScenarioId(3)));
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!(CliArgs::try_parse_from(["clickflow", "show", "abc"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            CliArgs::try_parse_from(["clickflow", "daemon", "--arm", "2", "--log-level", "debug"]).unwrap();
        assert!(matches!(args.command, Command::Daemon { arm: Some(ScenarioId(2)) }));
        assert_eq!(args.resolve_log_level("info"), "debug");
    }

    #[test]
    fn test_telegram_configure() {
        let args = CliArgs::try_parse_from([
            "clickflow", "telegram", "configure", "--token", "123:abc", "--chat-id", "-100",
        ])
        .unwrap();
        match args.command {
            Command::Telegram {
                command: TelegramCommand::Configure { token, chat_id, bot_name },
            } => {
                assert_eq!(token, "123:abc");
                assert_eq!(chat_id, "-100");
                assert!(bot_name.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let args = CliArgs::try_parse_from(["clickflow", "-c", "/tmp/cf.toml", "list"]).unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/cf.toml"));
    }
}
