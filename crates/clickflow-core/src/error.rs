use thiserror::Error;

/// Top-level error type for the Clickflow system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for ClickflowError` so that `?` works across crate
/// boundaries (the binary and the composition code only see this type).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClickflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Automation error: {0}")]
    Automation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for ClickflowError {
    fn from(err: toml::de::Error) -> Self {
        ClickflowError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ClickflowError {
    fn from(err: toml::ser::Error) -> Self {
        ClickflowError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ClickflowError {
    fn from(err: serde_json::Error) -> Self {
        ClickflowError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Clickflow operations.
pub type Result<T> = std::result::Result<T, ClickflowError>;
