//! The scenario engine.
//!
//! Owns the execution context and drives one run at a time. Each run is a
//! spawned task that walks the run plan step by step, racing every action
//! and pause against the run's cancellation token. Stopping removes the run
//! from the context first, so a task that loses the race never dispatches
//! another action.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use clickflow_action::ScenarioStore;
use clickflow_core::config::EngineConfig;
use clickflow_core::events::{DomainEvent, EventSender, StopReason};
use clickflow_core::types::{InboundMessage, ScenarioId, Timestamp};

use crate::context::{ActiveRun, ExecutionContext, ExecutionSnapshot, FinishedRun, RunOutcome, RunPlan, Step};
use crate::dispatch::{ActionOutcome, Adapters, Dispatcher};
use crate::error::EngineError;

/// What `start` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { run_id: Uuid },
    /// A Telegram scenario is now waiting for its first message.
    Armed,
    AlreadyArmed,
}

#[derive(Clone)]
pub struct ScenarioEngine {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<ScenarioStore>,
    dispatcher: Dispatcher,
    ctx: Mutex<ExecutionContext>,
    events: EventSender,
    config: EngineConfig,
}

impl ScenarioEngine {
    pub fn new(
        store: Arc<ScenarioStore>,
        adapters: Adapters,
        events: EventSender,
        config: EngineConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(adapters, &config);
        let ctx = ExecutionContext::new(config.start_enabled);
        Self {
            inner: Arc::new(Inner {
                store,
                dispatcher,
                ctx: Mutex::new(ctx),
                events,
                config,
            }),
        }
    }

    fn ctx(&self) -> MutexGuard<'_, ExecutionContext> {
        self.inner.ctx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DomainEvent) {
        let _ = self.inner.events.send(event);
    }

    pub fn store(&self) -> &Arc<ScenarioStore> {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.ctx().snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.ctx().queue_len()
    }

    // =========================================================================
    // Automation switch
    // =========================================================================

    pub fn is_automation_enabled(&self) -> bool {
        self.ctx().automation_enabled()
    }

    pub fn enable_automation(&self) {
        let changed = self.ctx().set_automation_enabled(true);
        if changed {
            tracing::info!("Automation enabled");
            self.emit(DomainEvent::AutomationEnabled {
                timestamp: Timestamp::now(),
            });
        }
    }

    /// Turn automation off, stopping any run and disarming any trigger.
    pub async fn disable_automation(&self) {
        let changed = self.ctx().set_automation_enabled(false);
        if changed {
            tracing::info!("Automation disabled");
            self.emit(DomainEvent::AutomationDisabled {
                timestamp: Timestamp::now(),
            });
        }
        self.stop_with(StopReason::AutomationDisabled).await;
    }

    /// Flip the switch. Returns the new value.
    pub async fn toggle_automation(&self) -> bool {
        if self.is_automation_enabled() {
            self.disable_automation().await;
            false
        } else {
            self.enable_automation();
            true
        }
    }

    // =========================================================================
    // Start / stop
    // =========================================================================

    /// Start a scenario, or arm it if it waits for Telegram messages and this
    /// call is not itself the trigger.
    pub fn start(
        &self,
        id: ScenarioId,
        triggered_by_telegram: bool,
    ) -> Result<StartOutcome, EngineError> {
        if !self.is_automation_enabled() {
            return Err(EngineError::AutomationDisabled);
        }
        let scenario = self.inner.store.get(id)?;
        let plan = Arc::new(RunPlan::compile(
            &scenario,
            triggered_by_telegram,
            &self.inner.config,
        )?);

        if scenario.trigger_by_telegram && !triggered_by_telegram {
            return self.arm(id);
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut ctx = self.ctx();
            if !ctx.automation_enabled() {
                return Err(EngineError::AutomationDisabled);
            }
            ctx.begin_run(ActiveRun {
                run_id,
                plan: Arc::clone(&plan),
                cancel: cancel.clone(),
            })?;
        }

        if plan.trigger_scenario {
            if let Err(e) = self.inner.store.set_waiting(id, false) {
                tracing::warn!(error = %e, scenario_id = %id, "Failed to clear waiting flag");
            }
        }

        tracing::info!(
            scenario_id = %id,
            name = %plan.name,
            repeats = plan.total_repeats,
            loop_forever = plan.loop_forever,
            triggered_by_telegram,
            "Scenario started"
        );
        self.emit(DomainEvent::ScenarioStarted {
            scenario_id: id,
            name: plan.name.clone(),
            run_id,
            triggered_by_telegram,
            total_repeats: plan.total_repeats,
            loop_forever: plan.loop_forever,
            timestamp: Timestamp::now(),
        });

        tokio::spawn(self.clone().drive(run_id, plan, cancel));
        Ok(StartOutcome::Started { run_id })
    }

    fn arm(&self, id: ScenarioId) -> Result<StartOutcome, EngineError> {
        let armed = {
            let mut ctx = self.ctx();
            if let Some(active) = ctx.active_run() {
                return Err(EngineError::StateConflict(format!(
                    "Scenario {} is already running",
                    active.plan.scenario_id
                )));
            }
            ctx.arm(id)?
        };
        if !armed {
            return Ok(StartOutcome::AlreadyArmed);
        }
        if let Err(e) = self.inner.store.set_waiting(id, true) {
            tracing::warn!(error = %e, scenario_id = %id, "Failed to set waiting flag");
        }
        tracing::info!(scenario_id = %id, "Scenario armed, waiting for Telegram message");
        self.emit(DomainEvent::ScenarioArmed {
            scenario_id: id,
            timestamp: Timestamp::now(),
        });
        Ok(StartOutcome::Armed)
    }

    /// Stop whatever is running, then start the given scenario.
    pub async fn quick_run(&self, id: ScenarioId) -> Result<StartOutcome, EngineError> {
        if !self.is_automation_enabled() {
            return Err(EngineError::AutomationDisabled);
        }
        self.stop_with(StopReason::Preempted).await;
        self.start(id, false)
    }

    /// Stop the active run. A stopped Telegram run is disarmed and its queue
    /// dropped. With nothing running, the waiting scenario is disarmed
    /// instead. An armed scenario survives the stop of a plain run and picks
    /// up its backlog afterwards. Returns false if there was nothing to stop.
    pub async fn stop(&self) -> bool {
        self.stop_with(StopReason::User).await
    }

    async fn stop_with(&self, reason: StopReason) -> bool {
        let (finished, disarmed) = {
            let mut ctx = self.ctx();
            let active = ctx.active_run().map(|r| r.run_id);
            let disarm_waiting = match reason {
                StopReason::AutomationDisabled => true,
                StopReason::Preempted => false,
                _ => active.is_none(),
            };
            let finished = match active {
                Some(run_id) => ctx.finish(
                    run_id,
                    RunOutcome::Stopped {
                        reason: reason.clone(),
                    },
                ),
                None => None,
            };
            let disarmed = if disarm_waiting { ctx.disarm() } else { None };
            (finished, disarmed)
        };

        let stopped = finished.is_some() || disarmed.is_some();
        if let Some(finished) = finished {
            finished.run.cancel.cancel();
            self.settle_finished(finished).await;
        }
        if let Some((id, discarded)) = disarmed {
            self.announce_disarmed(id, discarded);
        }
        self.schedule_retrigger();
        stopped
    }

    fn announce_disarmed(&self, id: ScenarioId, discarded: usize) {
        if let Err(e) = self.inner.store.set_waiting(id, false) {
            tracing::warn!(error = %e, scenario_id = %id, "Failed to clear waiting flag");
        }
        tracing::info!(scenario_id = %id, discarded, "Scenario disarmed");
        self.emit(DomainEvent::ScenarioDisarmed {
            scenario_id: id,
            timestamp: Timestamp::now(),
        });
        if discarded > 0 {
            self.emit(DomainEvent::QueueCleared {
                discarded,
                timestamp: Timestamp::now(),
            });
        }
    }

    // =========================================================================
    // Telegram messages
    // =========================================================================

    /// Queue inbound messages and trigger the armed scenario if it is idle.
    /// Messages without text are ignored. Messages that arrive while nothing
    /// is armed stay queued until a scenario is armed and the next message
    /// arrives. Returns how many were queued.
    pub async fn accept_messages(&self, messages: Vec<InboundMessage>) -> usize {
        let mut queued = Vec::new();
        {
            let mut ctx = self.ctx();
            for message in messages {
                if !message.has_text_content() {
                    continue;
                }
                let id = message.id;
                if ctx.enqueue(message) {
                    queued.push((id, ctx.queue_len()));
                }
            }
        }

        for (message_id, queue_len) in &queued {
            tracing::debug!(message_id, queue_len, "Message queued");
            self.emit(DomainEvent::MessageQueued {
                message_id: *message_id,
                queue_len: *queue_len,
                timestamp: Timestamp::now(),
            });
        }
        if !queued.is_empty() {
            self.try_trigger().await;
        }
        queued.len()
    }

    /// Stage the head message on the clipboard and start the armed scenario.
    async fn try_trigger(&self) -> bool {
        let pending = self.ctx().pending_trigger();
        let Some((scenario_id, message)) = pending else {
            return false;
        };

        if let Err(e) = self
            .inner
            .dispatcher
            .clipboard()
            .write_text(&message.content)
            .await
        {
            tracing::warn!(error = %e, message_id = message.id, "Failed to stage message on clipboard");
            return false;
        }

        let committed = self.ctx().commit_staged(scenario_id, message.id);
        if !committed {
            return false;
        }
        self.emit(DomainEvent::MessageStaged {
            message_id: message.id,
            scenario_id,
            timestamp: Timestamp::now(),
        });

        match self.start(scenario_id, true) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, scenario_id = %scenario_id, "Triggered start failed, message requeued");
                self.ctx().requeue_current();
                false
            }
        }
    }

    fn schedule_retrigger(&self) {
        let pending = self.ctx().pending_trigger().is_some();
        if !pending {
            return;
        }
        let engine = self.clone();
        let delay = Duration::from_millis(self.inner.config.retrigger_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.try_trigger().await;
        });
    }

    // =========================================================================
    // Run driver
    // =========================================================================

    async fn drive(self, run_id: Uuid, plan: Arc<RunPlan>, cancel: CancellationToken) {
        loop {
            let step = self.ctx().next_step(run_id);
            let Some(step) = step else {
                return;
            };

            match step {
                Step::Dispatch(index) => {
                    let action = &plan.actions[index];
                    let (repeat_iteration, total_repeats, loop_iteration) = self.ctx().progress();
                    tracing::debug!(
                        scenario_id = %plan.scenario_id,
                        index,
                        action = %action.name,
                        "Dispatching action"
                    );
                    self.emit(DomainEvent::ActionStarted {
                        scenario_id: plan.scenario_id,
                        index,
                        total: plan.actions.len(),
                        name: action.name.clone(),
                        repeat_iteration,
                        total_repeats,
                        loop_iteration,
                        timestamp: Timestamp::now(),
                    });

                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        r = self.inner.dispatcher.execute(&action.params, plan.movement_speed) => r,
                    };

                    match result {
                        Ok(outcome) => self.record_outcome(run_id, &plan, index, outcome),
                        Err(e) => {
                            tracing::warn!(
                                scenario_id = %plan.scenario_id,
                                index,
                                action = %action.name,
                                error = %e,
                                "Action failed, stopping scenario"
                            );
                            self.emit(DomainEvent::ActionFailed {
                                scenario_id: plan.scenario_id,
                                index,
                                name: action.name.clone(),
                                error: e.to_string(),
                                timestamp: Timestamp::now(),
                            });
                            let outcome = RunOutcome::Failed {
                                index,
                                action: action.name.clone(),
                                error: e.to_string(),
                            };
                            self.finish_run(run_id, outcome).await;
                            return;
                        }
                    }

                    let advanced = self.ctx().advance(run_id);
                    if !advanced {
                        return;
                    }
                    if !self.pause(&cancel, plan.action_delay_ms).await {
                        return;
                    }
                }
                Step::NextRepeat => {
                    let prepared = self.ctx().prepare_repeat(run_id);
                    let iteration = match prepared {
                        Ok(Some(iteration)) => iteration,
                        Ok(None) => return,
                        Err(e) => return self.abort(run_id, e).await,
                    };
                    tracing::debug!(scenario_id = %plan.scenario_id, iteration, total = plan.total_repeats, "Repeat completed");
                    self.emit(DomainEvent::RepeatCompleted {
                        scenario_id: plan.scenario_id,
                        iteration,
                        total: plan.total_repeats,
                        timestamp: Timestamp::now(),
                    });
                    if !self.pause(&cancel, plan.repeat_delay_ms).await {
                        return;
                    }
                    let resumed = self.ctx().resume(run_id);
                    match resumed {
                        Ok(true) => {}
                        Ok(false) => return,
                        Err(e) => return self.abort(run_id, e).await,
                    }
                }
                Step::NextLoop => {
                    let prepared = self.ctx().prepare_loop(run_id);
                    let loop_iteration = match prepared {
                        Ok(Some(n)) => n,
                        Ok(None) => return,
                        Err(e) => return self.abort(run_id, e).await,
                    };
                    tracing::debug!(scenario_id = %plan.scenario_id, loop_iteration, "Loop pass completed");
                    self.emit(DomainEvent::LoopCompleted {
                        scenario_id: plan.scenario_id,
                        loop_iteration,
                        timestamp: Timestamp::now(),
                    });
                    if !self.pause(&cancel, plan.loop_delay_ms).await {
                        return;
                    }
                    let resumed = self.ctx().resume(run_id);
                    match resumed {
                        Ok(true) => {}
                        Ok(false) => return,
                        Err(e) => return self.abort(run_id, e).await,
                    }
                }
                Step::Complete => {
                    self.finish_run(run_id, RunOutcome::Completed).await;
                    return;
                }
            }
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, cancel: &CancellationToken, ms: u64) -> bool {
        if ms == 0 {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
        }
    }

    fn record_outcome(&self, run_id: Uuid, plan: &RunPlan, index: usize, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Done => {}
            ActionOutcome::Skipped(reason) => {
                tracing::info!(scenario_id = %plan.scenario_id, index, reason = %reason, "Action skipped");
                self.emit(DomainEvent::ActionSkipped {
                    scenario_id: plan.scenario_id,
                    index,
                    name: plan.actions[index].name.clone(),
                    reason,
                    timestamp: Timestamp::now(),
                });
            }
            ActionOutcome::Waited { matched } => {
                if !matched {
                    tracing::info!(scenario_id = %plan.scenario_id, index, "Wait timed out, continuing");
                }
                self.emit(DomainEvent::WaitFinished {
                    scenario_id: plan.scenario_id,
                    index,
                    matched,
                    timestamp: Timestamp::now(),
                });
            }
            ActionOutcome::Captured { variable, value } => {
                self.ctx().set_variable(run_id, variable, value);
            }
        }
    }

    async fn abort(&self, run_id: Uuid, error: EngineError) {
        tracing::error!(error = %error, "Run aborted");
        let outcome = RunOutcome::Failed {
            index: self.snapshot().current_action_index,
            action: String::new(),
            error: error.to_string(),
        };
        self.finish_run(run_id, outcome).await;
    }

    async fn finish_run(&self, run_id: Uuid, outcome: RunOutcome) {
        let finished = self.ctx().finish(run_id, outcome);
        if let Some(finished) = finished {
            self.settle_finished(finished).await;
            self.schedule_retrigger();
        }
    }

    /// Announce a run that left the context and undo its side effects.
    async fn settle_finished(&self, finished: FinishedRun) {
        let plan = &finished.run.plan;
        let id = plan.scenario_id;

        match finished.outcome.stop_reason() {
            None => {
                tracing::info!(scenario_id = %id, name = %plan.name, "Scenario completed");
                self.emit(DomainEvent::ScenarioCompleted {
                    scenario_id: id,
                    name: plan.name.clone(),
                    run_id: finished.run.run_id,
                    timestamp: Timestamp::now(),
                });
            }
            Some(reason) => {
                tracing::info!(
                    scenario_id = %id,
                    name = %plan.name,
                    reason = %reason,
                    action_index = finished.action_index,
                    "Scenario stopped"
                );
                self.emit(DomainEvent::ScenarioStopped {
                    scenario_id: id,
                    name: plan.name.clone(),
                    run_id: finished.run.run_id,
                    reason,
                    action_index: finished.action_index,
                    timestamp: Timestamp::now(),
                });
            }
        }

        if finished.staged_message.is_some() {
            if let Err(e) = self.inner.dispatcher.clipboard().clear().await {
                tracing::warn!(error = %e, "Failed to clear staged message from clipboard");
            }
        }

        if finished.rearmed {
            if let Err(e) = self.inner.store.set_waiting(id, true) {
                tracing::warn!(error = %e, scenario_id = %id, "Failed to set waiting flag");
            }
            self.emit(DomainEvent::ScenarioArmed {
                scenario_id: id,
                timestamp: Timestamp::now(),
            });
        } else if plan.trigger_scenario {
            self.announce_disarmed(id, finished.discarded_messages);
        }
    }
}

impl std::fmt::Debug for ScenarioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioEngine")
            .field("context", &*self.ctx())
            .finish()
    }
}
