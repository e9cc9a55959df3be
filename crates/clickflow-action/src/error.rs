//! Error types for actions, adapters and the scenario store.

use clickflow_core::error::ClickflowError;
use clickflow_core::types::{ActionId, ScenarioId};

/// Malformed action parameters or scenario settings.
///
/// `field` is qualified with the action kind, e.g. `mouseClick.clickCount`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: String },
    #[error("{field} must be a number, got '{value}'")]
    NotANumber { field: String, value: String },
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall { field: String, min: i64, value: i64 },
    #[error("{field} must be at most {max}, got {value}")]
    TooLarge { field: String, max: i64, value: i64 },
    #[error("{field} is invalid: {reason}")]
    Invalid { field: String, reason: String },
    #[error("Unknown action type: {0}")]
    UnknownKind(String),
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError::Missing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A platform primitive (mouse, keyboard, clipboard, screen, chat) failed.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Automation primitive failed: {0}")]
    Failed(String),
    #[error("Not supported on this platform: {0}")]
    Unsupported(String),
    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),
    #[error("Message delivery failed: {0}")]
    Delivery(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the scenario store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(ScenarioId),
    #[error("Action {action} not found in scenario {scenario}")]
    ActionNotFound {
        scenario: ScenarioId,
        action: ActionId,
    },
    #[error("Cannot delete the last scenario")]
    LastScenario,
    #[error("Action index {index} out of range for {len} actions")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Storage error: {0}")]
    Storage(#[from] ClickflowError),
}

impl From<StoreError> for ClickflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ScenarioNotFound(_) | StoreError::ActionNotFound { .. } => {
                ClickflowError::NotFound(err.to_string())
            }
            StoreError::LastScenario => ClickflowError::StateConflict(err.to_string()),
            StoreError::IndexOutOfRange { .. } | StoreError::Validation(_) => {
                ClickflowError::Validation(err.to_string())
            }
            StoreError::Storage(inner) => inner,
        }
    }
}
