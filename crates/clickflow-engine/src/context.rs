//! The shared execution context.
//!
//! A single [`ExecutionContext`] describes what the engine is doing: the
//! active run and its counters, the armed Telegram scenario, the message
//! queue and the message currently being processed. It is plain data; the
//! engine holds it behind a mutex and never across an await point.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use clickflow_action::{ActionParams, Scenario};
use clickflow_core::config::EngineConfig;
use clickflow_core::events::StopReason;
use clickflow_core::types::{ActionId, InboundMessage, MovementSpeed, ScenarioId};

use crate::error::EngineError;
use crate::queue::MessageQueue;
use crate::state::EnginePhase;

// =============================================================================
// Run plan
// =============================================================================

/// An action with its parameters already validated.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub id: ActionId,
    pub name: String,
    pub params: ActionParams,
}

/// Immutable description of one run, compiled from a scenario at start.
///
/// Edits made to the scenario while it runs do not affect the plan.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub scenario_id: ScenarioId,
    pub name: String,
    pub actions: Vec<PlannedAction>,
    pub total_repeats: u32,
    pub loop_forever: bool,
    pub action_delay_ms: u64,
    pub repeat_delay_ms: u64,
    pub loop_delay_ms: u64,
    pub movement_speed: MovementSpeed,
    /// The scenario re-arms itself after each run.
    pub trigger_scenario: bool,
    pub triggered_by_telegram: bool,
}

impl RunPlan {
    pub fn compile(
        scenario: &Scenario,
        triggered_by_telegram: bool,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        if scenario.actions.is_empty() {
            return Err(EngineError::EmptyScenario(scenario.id));
        }

        let mut actions = Vec::with_capacity(scenario.actions.len());
        for (index, action) in scenario.actions.iter().enumerate() {
            let params = action.params().map_err(|source| EngineError::InvalidAction {
                index,
                name: action.label().to_string(),
                source,
            })?;
            actions.push(PlannedAction {
                id: action.id,
                name: action.label().to_string(),
                params,
            });
        }

        // A zero delay falls back to the configured pauses.
        let (action_delay_ms, repeat_delay_ms) = if scenario.action_delay_ms > 0 {
            (scenario.action_delay_ms, scenario.action_delay_ms)
        } else {
            (config.default_action_delay_ms, config.repeat_delay_ms)
        };

        Ok(Self {
            scenario_id: scenario.id,
            name: scenario.name.clone(),
            actions,
            total_repeats: scenario.effective_repeat_count(),
            loop_forever: scenario.loop_forever && !scenario.trigger_by_telegram,
            action_delay_ms,
            repeat_delay_ms,
            loop_delay_ms: config.loop_delay_ms,
            movement_speed: scenario.movement_speed,
            trigger_scenario: scenario.trigger_by_telegram,
            triggered_by_telegram,
        })
    }
}

/// The run currently owning the engine.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_id: Uuid,
    pub plan: Arc<RunPlan>,
    pub cancel: CancellationToken,
}

// =============================================================================
// Steps and outcomes
// =============================================================================

/// What the driver does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Dispatch(usize),
    /// Pass finished, another repeat remains.
    NextRepeat,
    /// Pass finished, loop-forever is on.
    NextLoop,
    Complete,
}

/// Decide the next step from the cursor and repeat policy.
pub fn next_step(
    cursor: usize,
    action_count: usize,
    repeat_iteration: u32,
    total_repeats: u32,
    loop_forever: bool,
) -> Step {
    if cursor < action_count {
        Step::Dispatch(cursor)
    } else if loop_forever {
        Step::NextLoop
    } else if repeat_iteration < total_repeats {
        Step::NextRepeat
    } else {
        Step::Complete
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Stopped { reason: StopReason },
    Failed {
        index: usize,
        action: String,
        error: String,
    },
}

impl RunOutcome {
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            RunOutcome::Completed => None,
            RunOutcome::Stopped { reason } => Some(reason.clone()),
            RunOutcome::Failed { .. } => Some(StopReason::ActionFailed),
        }
    }
}

/// Everything the engine needs to clean up after a run left the context.
#[derive(Debug)]
pub struct FinishedRun {
    pub run: ActiveRun,
    pub outcome: RunOutcome,
    pub action_index: usize,
    /// The message that triggered the run, if any. Its clipboard staging
    /// must be cleared.
    pub staged_message: Option<InboundMessage>,
    pub rearmed: bool,
    pub discarded_messages: usize,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only view of the context for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub phase: EnginePhase,
    pub automation_enabled: bool,
    pub running_scenario_id: Option<ScenarioId>,
    pub run_id: Option<Uuid>,
    pub triggered_by_telegram: bool,
    pub current_action_index: usize,
    pub total_actions: usize,
    pub current_repeat_iteration: u32,
    pub total_repeat_count: u32,
    pub loop_forever: bool,
    pub loop_iteration_count: u64,
    pub waiting_scenario_id: Option<ScenarioId>,
    pub current_message: Option<InboundMessage>,
    pub queued_messages: usize,
    pub last_scenario_id: Option<ScenarioId>,
    pub last_outcome: Option<RunOutcome>,
    pub variables: HashMap<String, String>,
}

impl ExecutionSnapshot {
    pub fn is_running(&self) -> bool {
        self.phase.is_active()
    }
}

// =============================================================================
// Context
// =============================================================================

#[derive(Debug)]
pub struct ExecutionContext {
    phase: EnginePhase,
    automation_enabled: bool,
    run: Option<ActiveRun>,
    waiting_scenario_id: Option<ScenarioId>,
    current_message: Option<InboundMessage>,
    queue: MessageQueue,
    current_action_index: usize,
    current_repeat_iteration: u32,
    total_repeat_count: u32,
    loop_iteration_count: u64,
    last_scenario_id: Option<ScenarioId>,
    last_outcome: Option<RunOutcome>,
    variables: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new(automation_enabled: bool) -> Self {
        Self {
            phase: EnginePhase::Idle,
            automation_enabled,
            run: None,
            waiting_scenario_id: None,
            current_message: None,
            queue: MessageQueue::new(),
            current_action_index: 0,
            current_repeat_iteration: 0,
            total_repeat_count: 0,
            loop_iteration_count: 0,
            last_scenario_id: None,
            last_outcome: None,
            variables: HashMap::new(),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    fn transition(&mut self, to: EnginePhase) -> Result<(), EngineError> {
        if !self.phase.can_transition_to(&to) {
            return Err(EngineError::InvalidTransition(self.phase, to));
        }
        tracing::debug!(from = %self.phase, to = %to, "Engine phase transition");
        self.phase = to;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Automation switch
    // -------------------------------------------------------------------------

    pub fn automation_enabled(&self) -> bool {
        self.automation_enabled
    }

    /// Returns true if the value changed.
    pub fn set_automation_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.automation_enabled != enabled;
        self.automation_enabled = enabled;
        changed
    }

    // -------------------------------------------------------------------------
    // Runs
    // -------------------------------------------------------------------------

    pub fn active_run(&self) -> Option<&ActiveRun> {
        self.run.as_ref()
    }

    pub fn is_current(&self, run_id: Uuid) -> bool {
        self.run.as_ref().is_some_and(|r| r.run_id == run_id)
    }

    /// Install a run and reset the counters. Starting the armed scenario
    /// consumes the arm.
    pub fn begin_run(&mut self, run: ActiveRun) -> Result<(), EngineError> {
        if let Some(active) = &self.run {
            return Err(EngineError::StateConflict(format!(
                "Scenario {} is already running",
                active.plan.scenario_id
            )));
        }
        self.transition(EnginePhase::Running)?;
        if self.waiting_scenario_id == Some(run.plan.scenario_id) {
            self.waiting_scenario_id = None;
        }
        self.current_action_index = 0;
        self.current_repeat_iteration = 1;
        self.total_repeat_count = run.plan.total_repeats;
        self.loop_iteration_count = 0;
        self.last_scenario_id = Some(run.plan.scenario_id);
        self.variables.clear();
        self.run = Some(run);
        Ok(())
    }

    /// Next step for the given run, or `None` if it is no longer current.
    pub fn next_step(&self, run_id: Uuid) -> Option<Step> {
        let run = self.run.as_ref().filter(|r| r.run_id == run_id)?;
        Some(next_step(
            self.current_action_index,
            run.plan.actions.len(),
            self.current_repeat_iteration,
            self.total_repeat_count,
            run.plan.loop_forever,
        ))
    }

    /// Repeat iteration, total repeats and loop count of the active run.
    pub fn progress(&self) -> (u32, u32, u64) {
        (
            self.current_repeat_iteration,
            self.total_repeat_count,
            self.loop_iteration_count,
        )
    }

    /// Move past the action just dispatched.
    pub fn advance(&mut self, run_id: Uuid) -> bool {
        if !self.is_current(run_id) {
            return false;
        }
        self.current_action_index += 1;
        true
    }

    /// Close a repeat pass. Returns the iteration that just finished.
    pub fn prepare_repeat(&mut self, run_id: Uuid) -> Result<Option<u32>, EngineError> {
        if !self.is_current(run_id) {
            return Ok(None);
        }
        self.transition(EnginePhase::AwaitingRepeat)?;
        let finished = self.current_repeat_iteration;
        self.current_repeat_iteration += 1;
        Ok(Some(finished))
    }

    /// Close a loop pass. Returns the new loop count.
    pub fn prepare_loop(&mut self, run_id: Uuid) -> Result<Option<u64>, EngineError> {
        if !self.is_current(run_id) {
            return Ok(None);
        }
        self.transition(EnginePhase::AwaitingRepeat)?;
        self.loop_iteration_count += 1;
        Ok(Some(self.loop_iteration_count))
    }

    /// Start the next pass from the first action.
    pub fn resume(&mut self, run_id: Uuid) -> Result<bool, EngineError> {
        if !self.is_current(run_id) {
            return Ok(false);
        }
        self.transition(EnginePhase::Running)?;
        self.current_action_index = 0;
        Ok(true)
    }

    /// Remove the run from the context. Counters are left as they were so a
    /// stopped run still shows where it stopped.
    ///
    /// A trigger scenario that completes is armed again; one that stops or
    /// fails is disarmed and the queue is dropped.
    pub fn finish(&mut self, run_id: Uuid, outcome: RunOutcome) -> Option<FinishedRun> {
        if !self.is_current(run_id) {
            return None;
        }
        let run = self.run.take()?;

        let terminal = match outcome {
            RunOutcome::Completed => EnginePhase::Completed,
            _ => EnginePhase::Stopped,
        };
        if let Err(e) = self.transition(terminal) {
            tracing::warn!(error = %e, "Forcing terminal phase");
            self.phase = terminal;
        }

        let staged_message = if run.plan.triggered_by_telegram {
            self.current_message.take()
        } else {
            None
        };

        let mut rearmed = false;
        let mut discarded_messages = 0;
        if run.plan.trigger_scenario {
            if outcome == RunOutcome::Completed {
                self.waiting_scenario_id = Some(run.plan.scenario_id);
                rearmed = true;
            } else {
                discarded_messages = self.queue.clear();
                if self.waiting_scenario_id == Some(run.plan.scenario_id) {
                    self.waiting_scenario_id = None;
                }
            }
        }

        self.settle();
        self.last_outcome = Some(outcome.clone());

        Some(FinishedRun {
            run,
            outcome,
            action_index: self.current_action_index,
            staged_message,
            rearmed,
            discarded_messages,
        })
    }

    fn settle(&mut self) {
        let target = if self.waiting_scenario_id.is_some() {
            EnginePhase::WaitingForTrigger
        } else {
            EnginePhase::Idle
        };
        if let Err(e) = self.transition(target) {
            tracing::warn!(error = %e, "Forcing settle phase");
            self.phase = target;
        }
    }

    pub fn set_variable(&mut self, run_id: Uuid, name: String, value: String) {
        if self.is_current(run_id) {
            self.variables.insert(name, value);
        }
    }

    // -------------------------------------------------------------------------
    // Trigger gating
    // -------------------------------------------------------------------------

    pub fn waiting_scenario_id(&self) -> Option<ScenarioId> {
        self.waiting_scenario_id
    }

    /// Arm a Telegram scenario. Returns false if it was already armed.
    pub fn arm(&mut self, id: ScenarioId) -> Result<bool, EngineError> {
        match self.waiting_scenario_id {
            Some(current) if current == id => Ok(false),
            Some(current) => Err(EngineError::StateConflict(format!(
                "Scenario {current} is already waiting for a Telegram message"
            ))),
            None => {
                if !self.phase.is_active() {
                    self.transition(EnginePhase::WaitingForTrigger)?;
                }
                self.waiting_scenario_id = Some(id);
                Ok(true)
            }
        }
    }

    /// Disarm and drop queued messages. Returns the disarmed scenario and how
    /// many messages were discarded.
    pub fn disarm(&mut self) -> Option<(ScenarioId, usize)> {
        let id = self.waiting_scenario_id.take()?;
        let discarded = self.queue.clear();
        if self.phase == EnginePhase::WaitingForTrigger {
            if let Err(e) = self.transition(EnginePhase::Idle) {
                tracing::warn!(error = %e, "Forcing idle phase");
                self.phase = EnginePhase::Idle;
            }
        }
        Some((id, discarded))
    }

    // -------------------------------------------------------------------------
    // Message queue
    // -------------------------------------------------------------------------

    pub fn enqueue(&mut self, message: InboundMessage) -> bool {
        self.queue.push(message)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear_queue(&mut self) -> usize {
        self.queue.clear()
    }

    /// The scenario and message to trigger next, if the engine can accept
    /// one. Nothing is removed from the queue.
    pub fn pending_trigger(&self) -> Option<(ScenarioId, InboundMessage)> {
        if !self.automation_enabled || self.run.is_some() || self.current_message.is_some() {
            return None;
        }
        let id = self.waiting_scenario_id?;
        let message = self.queue.front()?.clone();
        Some((id, message))
    }

    /// Take the head message after its content was staged. Fails if the
    /// context moved on while staging.
    pub fn commit_staged(&mut self, scenario_id: ScenarioId, message_id: i64) -> bool {
        let still_pending = self
            .pending_trigger()
            .is_some_and(|(id, head)| id == scenario_id && head.id == message_id);
        if !still_pending {
            return false;
        }
        self.current_message = self.queue.pop_front();
        true
    }

    /// Put the current message back at the head of the queue.
    pub fn requeue_current(&mut self) -> Option<i64> {
        let message = self.current_message.take()?;
        let id = message.id;
        self.queue.push_front(message);
        Some(id)
    }

    /// Drop the current message without requeueing it.
    pub fn take_current_message(&mut self) -> Option<InboundMessage> {
        self.current_message.take()
    }

    // -------------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------------

    pub fn snapshot(&self) -> ExecutionSnapshot {
        let run = self.run.as_ref();
        ExecutionSnapshot {
            phase: self.phase,
            automation_enabled: self.automation_enabled,
            running_scenario_id: run.map(|r| r.plan.scenario_id),
            run_id: run.map(|r| r.run_id),
            triggered_by_telegram: run.is_some_and(|r| r.plan.triggered_by_telegram),
            current_action_index: self.current_action_index,
            total_actions: run.map(|r| r.plan.actions.len()).unwrap_or(0),
            current_repeat_iteration: self.current_repeat_iteration,
            total_repeat_count: self.total_repeat_count,
            loop_forever: run.is_some_and(|r| r.plan.loop_forever),
            loop_iteration_count: self.loop_iteration_count,
            waiting_scenario_id: self.waiting_scenario_id,
            current_message: self.current_message.clone(),
            queued_messages: self.queue.len(),
            last_scenario_id: self.last_scenario_id,
            last_outcome: self.last_outcome.clone(),
            variables: self.variables.clone(),
        }
    }
}
