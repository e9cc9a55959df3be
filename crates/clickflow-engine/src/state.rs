//! Engine phase and its transition table.
//!
//! - Idle -> Running (start)
//! - Idle -> WaitingForTrigger (arm a Telegram scenario)
//! - WaitingForTrigger -> Running (message arrived, or another scenario started)
//! - WaitingForTrigger -> Idle (disarm)
//! - Running <-> AwaitingRepeat (between passes)
//! - Running | AwaitingRepeat -> Completed | Stopped
//! - Completed | Stopped -> Idle | WaitingForTrigger (settle)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse state of the execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Idle,
    Running,
    /// A pass finished; the next repeat or loop pass is scheduled.
    AwaitingRepeat,
    /// A Telegram scenario is armed. Does not count as running.
    WaitingForTrigger,
    Stopped,
    Completed,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnginePhase::Idle => "idle",
            EnginePhase::Running => "running",
            EnginePhase::AwaitingRepeat => "awaiting_repeat",
            EnginePhase::WaitingForTrigger => "waiting_for_trigger",
            EnginePhase::Stopped => "stopped",
            EnginePhase::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl EnginePhase {
    pub fn can_transition_to(&self, target: &EnginePhase) -> bool {
        use EnginePhase::*;
        matches!(
            (self, target),
            (Idle, Running)
                | (Idle, WaitingForTrigger)
                | (WaitingForTrigger, Running)
                | (WaitingForTrigger, Idle)
                | (Running, AwaitingRepeat)
                | (AwaitingRepeat, Running)
                | (Running, Completed)
                | (Running, Stopped)
                | (AwaitingRepeat, Stopped)
                | (Completed, Idle)
                | (Completed, WaitingForTrigger)
                | (Stopped, Idle)
                | (Stopped, WaitingForTrigger)
        )
    }

    /// A scenario is dispatching or between passes.
    pub fn is_active(&self) -> bool {
        matches!(self, EnginePhase::Running | EnginePhase::AwaitingRepeat)
    }
}
