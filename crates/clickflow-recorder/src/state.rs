//! Recorder state machine with thread-safe transitions.
//!
//! - Idle -> Armed (start recording)
//! - Armed -> Idle (stop, or Enter pressed)

use std::fmt;
use std::sync::{Arc, Mutex};

use clickflow_core::error::ClickflowError;

/// Operational state of the coordinate recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecorderState {
    /// Hook events are ignored.
    Idle,
    /// Primary-button clicks are being captured.
    Armed,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderState::Idle => write!(f, "Idle"),
            RecorderState::Armed => write!(f, "Armed"),
        }
    }
}

impl RecorderState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &RecorderState) -> bool {
        matches!(
            (self, target),
            (RecorderState::Idle, RecorderState::Armed) | (RecorderState::Armed, RecorderState::Idle)
        )
    }
}

/// Shared recorder state, validated on every transition.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<RecorderState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::Idle)),
        }
    }

    pub fn current(&self) -> RecorderState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(RecorderState::Idle)
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: RecorderState) -> Result<(), ClickflowError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| ClickflowError::Recorder(format!("State mutex poisoned: {}", e)))?;
        if state.can_transition_to(&target) {
            tracing::debug!("Recorder state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(ClickflowError::Recorder(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }
}
