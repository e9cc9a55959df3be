//! Error types for the execution engine.

use clickflow_action::{StoreError, ValidationError};
use clickflow_core::error::ClickflowError;
use clickflow_core::types::ScenarioId;

use crate::state::EnginePhase;

/// Errors returned by engine operations.
///
/// Failures of individual actions during a run are not returned here: the
/// run is already detached by then, so they surface as `ActionFailed`
/// events and in the snapshot's last outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Automation is turned off")]
    AutomationDisabled,
    #[error("Scenario {0} has no actions")]
    EmptyScenario(ScenarioId),
    #[error("State conflict: {0}")]
    StateConflict(String),
    #[error("Action {index} ({name}) is invalid: {source}")]
    InvalidAction {
        index: usize,
        name: String,
        source: ValidationError,
    },
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(EnginePhase, EnginePhase),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<EngineError> for ClickflowError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(inner) => inner.into(),
            EngineError::InvalidAction { .. } => ClickflowError::Validation(err.to_string()),
            EngineError::StateConflict(_)
            | EngineError::InvalidTransition(..)
            | EngineError::AutomationDisabled => ClickflowError::StateConflict(err.to_string()),
            other => ClickflowError::Execution(other.to_string()),
        }
    }
}
