use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{Point, ScenarioId, Timestamp};

/// Capacity of the domain event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Sending half of the domain event stream.
pub type EventSender = broadcast::Sender<DomainEvent>;

/// Create the broadcast channel that carries [`DomainEvent`]s to subscribers.
pub fn event_channel() -> EventSender {
    let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Why a run ended before completing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called.
    User,
    /// An action failed; the run was aborted.
    ActionFailed,
    /// A quick-run replaced the current run.
    Preempted,
    /// The automation master switch was turned off.
    AutomationDisabled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::User => "user",
            StopReason::ActionFailed => "action_failed",
            StopReason::Preempted => "preempted",
            StopReason::AutomationDisabled => "automation_disabled",
        };
        write!(f, "{s}")
    }
}

/// All domain events that can occur in the Clickflow system.
///
/// Events are emitted after state changes and consumed by:
/// - UI subscribers (progress display)
/// - The Telegram notifier
/// - The CLI, which waits on terminal run events
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Automation Events
    // =========================================================================
    AutomationEnabled {
        timestamp: Timestamp,
    },

    AutomationDisabled {
        timestamp: Timestamp,
    },

    // =========================================================================
    // Run Events
    // =========================================================================
    /// A scenario began dispatching actions.
    ScenarioStarted {
        scenario_id: ScenarioId,
        name: String,
        run_id: Uuid,
        triggered_by_telegram: bool,
        total_repeats: u32,
        loop_forever: bool,
        timestamp: Timestamp,
    },

    /// A Telegram-triggered scenario is armed and waiting for a message.
    ScenarioArmed {
        scenario_id: ScenarioId,
        timestamp: Timestamp,
    },

    /// An armed scenario stopped waiting without running.
    ScenarioDisarmed {
        scenario_id: ScenarioId,
        timestamp: Timestamp,
    },

    /// An action is about to be dispatched.
    ActionStarted {
        scenario_id: ScenarioId,
        index: usize,
        total: usize,
        name: String,
        repeat_iteration: u32,
        total_repeats: u32,
        loop_iteration: u64,
        timestamp: Timestamp,
    },

    /// An action was skipped without failing the run.
    ActionSkipped {
        scenario_id: ScenarioId,
        index: usize,
        name: String,
        reason: String,
        timestamp: Timestamp,
    },

    /// An action failed; the run is about to stop.
    ActionFailed {
        scenario_id: ScenarioId,
        index: usize,
        name: String,
        error: String,
        timestamp: Timestamp,
    },

    /// A polling wait finished, either matched or timed out.
    WaitFinished {
        scenario_id: ScenarioId,
        index: usize,
        matched: bool,
        timestamp: Timestamp,
    },

    /// One pass over the action list finished and another repeat follows.
    RepeatCompleted {
        scenario_id: ScenarioId,
        iteration: u32,
        total: u32,
        timestamp: Timestamp,
    },

    /// One pass of a loop-forever scenario finished.
    LoopCompleted {
        scenario_id: ScenarioId,
        loop_iteration: u64,
        timestamp: Timestamp,
    },

    ScenarioCompleted {
        scenario_id: ScenarioId,
        name: String,
        run_id: Uuid,
        timestamp: Timestamp,
    },

    ScenarioStopped {
        scenario_id: ScenarioId,
        name: String,
        run_id: Uuid,
        reason: StopReason,
        action_index: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Telegram Events
    // =========================================================================
    /// An inbound message was appended to the trigger queue.
    MessageQueued {
        message_id: i64,
        queue_len: usize,
        timestamp: Timestamp,
    },

    /// A queued message was placed on the clipboard for a triggered run.
    MessageStaged {
        message_id: i64,
        scenario_id: ScenarioId,
        timestamp: Timestamp,
    },

    /// The trigger queue was discarded.
    QueueCleared {
        discarded: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Recorder Events
    // =========================================================================
    RecordingStarted {
        session_id: Uuid,
        timestamp: Timestamp,
    },

    CoordinateCaptured {
        session_id: Uuid,
        point: Point,
        count: usize,
        timestamp: Timestamp,
    },

    RecordingStopped {
        session_id: Uuid,
        points: Vec<Point>,
        by_enter_key: bool,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::AutomationEnabled { timestamp }
            | DomainEvent::AutomationDisabled { timestamp }
            | DomainEvent::ScenarioStarted { timestamp, .. }
            | DomainEvent::ScenarioArmed { timestamp, .. }
            | DomainEvent::ScenarioDisarmed { timestamp, .. }
            | DomainEvent::ActionStarted { timestamp, .. }
            | DomainEvent::ActionSkipped { timestamp, .. }
            | DomainEvent::ActionFailed { timestamp, .. }
            | DomainEvent::WaitFinished { timestamp, .. }
            | DomainEvent::RepeatCompleted { timestamp, .. }
            | DomainEvent::LoopCompleted { timestamp, .. }
            | DomainEvent::ScenarioCompleted { timestamp, .. }
            | DomainEvent::ScenarioStopped { timestamp, .. }
            | DomainEvent::MessageQueued { timestamp, .. }
            | DomainEvent::MessageStaged { timestamp, .. }
            | DomainEvent::QueueCleared { timestamp, .. }
            | DomainEvent::RecordingStarted { timestamp, .. }
            | DomainEvent::CoordinateCaptured { timestamp, .. }
            | DomainEvent::RecordingStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::AutomationEnabled { .. } => "automation_enabled",
            DomainEvent::AutomationDisabled { .. } => "automation_disabled",
            DomainEvent::ScenarioStarted { .. } => "scenario_started",
            DomainEvent::ScenarioArmed { .. } => "scenario_armed",
            DomainEvent::ScenarioDisarmed { .. } => "scenario_disarmed",
            DomainEvent::ActionStarted { .. } => "action_started",
            DomainEvent::ActionSkipped { .. } => "action_skipped",
            DomainEvent::ActionFailed { .. } => "action_failed",
            DomainEvent::WaitFinished { .. } => "wait_finished",
            DomainEvent::RepeatCompleted { .. } => "repeat_completed",
            DomainEvent::LoopCompleted { .. } => "loop_completed",
            DomainEvent::ScenarioCompleted { .. } => "scenario_completed",
            DomainEvent::ScenarioStopped { .. } => "scenario_stopped",
            DomainEvent::MessageQueued { .. } => "message_queued",
            DomainEvent::MessageStaged { .. } => "message_staged",
            DomainEvent::QueueCleared { .. } => "queue_cleared",
            DomainEvent::RecordingStarted { .. } => "recording_started",
            DomainEvent::CoordinateCaptured { .. } => "coordinate_captured",
            DomainEvent::RecordingStopped { .. } => "recording_stopped",
        }
    }

    /// True for events that end a run (completed or stopped).
    pub fn is_run_terminal(&self) -> bool {
        matches!(
            self,
            DomainEvent::ScenarioCompleted { .. } | DomainEvent::ScenarioStopped { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp() {
        let ts = Timestamp::now();
        let event = DomainEvent::ScenarioArmed {
            scenario_id: ScenarioId(1),
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
    }

    #[test]
    fn test_event_name() {
        let event = DomainEvent::CoordinateCaptured {
            session_id: Uuid::new_v4(),
            point: Point::new(1, 2),
            count: 1,
            timestamp: Timestamp::now(),
        };
        assert_eq!(event.event_name(), "coordinate_captured");
    }

    #[test]
    fn test_run_terminal_events() {
        let completed = DomainEvent::ScenarioCompleted {
            scenario_id: ScenarioId(1),
            name: "a".into(),
            run_id: Uuid::new_v4(),
            timestamp: Timestamp::now(),
        };
        let armed = DomainEvent::ScenarioArmed {
            scenario_id: ScenarioId(1),
            timestamp: Timestamp::now(),
        };
        assert!(completed.is_run_terminal());
        assert!(!armed.is_run_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::ScenarioStopped {
            scenario_id: ScenarioId(3),
            name: "Login".into(),
            run_id: Uuid::new_v4(),
            reason: StopReason::ActionFailed,
            action_index: 2,
            timestamp: Timestamp::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ScenarioStopped"));
        assert!(json.contains("action_failed"));
    }

    #[tokio::test]
    async fn test_event_channel_delivers_to_subscribers() {
        let tx = event_channel();
        let mut rx = tx.subscribe();
        tx.send(DomainEvent::AutomationEnabled {
            timestamp: Timestamp::now(),
        })
        .unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_name(), "automation_enabled");
    }
}
