//! End-to-end execution tests for the scenario engine.
//!
//! Every test runs on a paused clock with recording adapters, so timing
//! assertions are exact and no real input is generated.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::Instant;

use clickflow_action::{
    ActionKind, AdapterError, AutomationAdapter, ClipboardAdapter, ScenarioSettings, ScenarioStore,
};
use clickflow_core::config::EngineConfig;
use clickflow_core::events::{event_channel, DomainEvent, StopReason};
use clickflow_core::types::{
    InboundMessage, MessageKind, MouseButton, MovementSpeed, Point, Region, Rgb, ScenarioId,
    Timestamp, MEDIA_PLACEHOLDER,
};
use clickflow_engine::{Adapters, EngineError, EnginePhase, RunOutcome, ScenarioEngine, StartOutcome};
use clickflow_storage::MemoryKvStore;

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct FakeAutomation {
    calls: Mutex<Vec<(String, Instant)>>,
    fail_clicks: Mutex<bool>,
}

impl FakeAutomation {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    fn times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl AutomationAdapter for FakeAutomation {
    async fn move_mouse(&self, point: Point, _speed: MovementSpeed) -> Result<(), AdapterError> {
        self.record(format!("move {point}"));
        Ok(())
    }

    async fn click(&self, point: Point, _button: MouseButton, _count: u8) -> Result<(), AdapterError> {
        if *self.fail_clicks.lock().unwrap() {
            return Err(AdapterError::Failed("input blocked".into()));
        }
        self.record(format!("click {point}"));
        Ok(())
    }

    async fn type_text(&self, text: &str, _delay: u64) -> Result<(), AdapterError> {
        self.record(format!("type {text}"));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), AdapterError> {
        self.record(format!("key {key}"));
        Ok(())
    }

    async fn press_hotkey(&self, keys: &[String]) -> Result<(), AdapterError> {
        self.record(format!("hotkey {}", keys.join("+")));
        Ok(())
    }

    async fn launch_app(&self, executable: &str, _args: &[String]) -> Result<(), AdapterError> {
        self.record(format!("launch {executable}"));
        Ok(())
    }

    async fn activate_window(&self, title: Option<&str>, _process: Option<&str>) -> Result<(), AdapterError> {
        self.record(format!("activate {}", title.unwrap_or("")));
        Ok(())
    }

    async fn read_pixel(&self, _point: Point) -> Result<Rgb, AdapterError> {
        Ok(Rgb::new(0, 0, 0))
    }

    async fn capture_region(&self, _region: Region, path: &Path) -> Result<(), AdapterError> {
        self.record(format!("capture {}", path.display()));
        Ok(())
    }

    async fn capture_fullscreen(&self, path: &Path) -> Result<(), AdapterError> {
        self.record(format!("capture {}", path.display()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeClipboard {
    text: Mutex<String>,
    writes: Mutex<Vec<String>>,
}

impl FakeClipboard {
    fn current(&self) -> String {
        self.text.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipboardAdapter for FakeClipboard {
    async fn read_text(&self) -> Result<String, AdapterError> {
        Ok(self.current())
    }

    async fn write_text(&self, text: &str) -> Result<(), AdapterError> {
        *self.text.lock().unwrap() = text.to_string();
        self.writes.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AdapterError> {
        self.text.lock().unwrap().clear();
        Ok(())
    }
}

struct Harness {
    engine: ScenarioEngine,
    store: Arc<ScenarioStore>,
    automation: Arc<FakeAutomation>,
    clipboard: Arc<FakeClipboard>,
    events: broadcast::Receiver<DomainEvent>,
}

impl Harness {
    fn new() -> Self {
        let config = EngineConfig {
            start_enabled: true,
            ..EngineConfig::default()
        };
        let store = Arc::new(ScenarioStore::open(Arc::new(MemoryKvStore::new()), 500).unwrap());
        let automation = Arc::new(FakeAutomation::default());
        let clipboard = Arc::new(FakeClipboard::default());
        let adapters = Adapters {
            automation: automation.clone(),
            clipboard: clipboard.clone(),
            telegram: None,
            screenshots_dir: std::env::temp_dir().join("clickflow-engine-tests"),
        };
        let events = event_channel();
        let rx = events.subscribe();
        let engine = ScenarioEngine::new(Arc::clone(&store), adapters, events, config);
        Self {
            engine,
            store,
            automation,
            clipboard,
            events: rx,
        }
    }

    /// Create a scenario with the given inter-action delay and actions.
    fn scenario(&self, name: &str, delay_ms: u64, actions: Vec<(ActionKind, Value)>) -> ScenarioId {
        let s = self.store.create(name).unwrap();
        self.store
            .update_settings(
                s.id,
                ScenarioSettings {
                    action_delay_ms: Some(delay_ms),
                    ..Default::default()
                },
            )
            .unwrap();
        for (kind, params) in actions {
            self.store
                .add_action(s.id, kind, "", params.as_object().cloned().unwrap())
                .unwrap();
        }
        s.id
    }

    fn settings(&self, id: ScenarioId, settings: ScenarioSettings) {
        self.store.update_settings(id, settings).unwrap();
    }

    fn drain_events(&mut self) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

fn click(x: i32, y: i32) -> (ActionKind, Value) {
    (ActionKind::MouseClick, json!({ "x": x, "y": y }))
}

fn delay(ms: u64) -> (ActionKind, Value) {
    (ActionKind::Delay, json!({ "durationMs": ms }))
}

fn type_clipboard() -> (ActionKind, Value) {
    (ActionKind::TypeText, json!({}))
}

fn message(id: i64, content: &str) -> InboundMessage {
    InboundMessage {
        id,
        time: Timestamp(1_700_000_000 + id),
        sender: "Alice".into(),
        username: "@alice".into(),
        content: content.into(),
        kind: MessageKind::Text,
        chat_id: Some(42),
        unread: true,
    }
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =============================================================================
// Repeat and loop policy
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_repeat_count_runs_each_pass_then_completes() {
    let mut h = Harness::new();
    let id = h.scenario("Repeat", 0, vec![click(10, 20)]);
    h.settings(
        id,
        ScenarioSettings {
            repeat_count: Some(3),
            ..Default::default()
        },
    );

    let started = Instant::now();
    let outcome = h.engine.start(id, false).unwrap();
    assert!(matches!(outcome, StartOutcome::Started { .. }));
    settle(10_000).await;

    assert_eq!(h.automation.count("click (10, 20)"), 3);
    let offsets: Vec<Duration> = h.automation.times().iter().map(|t| *t - started).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::ZERO,
            Duration::from_millis(1500),
            Duration::from_millis(3000)
        ]
    );

    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::Idle);
    assert_eq!(snap.last_outcome, Some(RunOutcome::Completed));
    assert_eq!(snap.current_repeat_iteration, 3);

    let events = h.drain_events();
    let repeats = events
        .iter()
        .filter(|e| matches!(e, DomainEvent::RepeatCompleted { .. }))
        .count();
    assert_eq!(repeats, 2);
    assert!(matches!(events.last(), Some(DomainEvent::ScenarioCompleted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_repeat_delay_uses_action_delay_when_set() {
    let h = Harness::new();
    let id = h.scenario("Paced", 300, vec![click(1, 1)]);
    h.settings(
        id,
        ScenarioSettings {
            repeat_count: Some(2),
            ..Default::default()
        },
    );

    let started = Instant::now();
    h.engine.start(id, false).unwrap();
    settle(5_000).await;

    // 300ms after the action, then 300ms between passes.
    let offsets: Vec<Duration> = h.automation.times().iter().map(|t| *t - started).collect();
    assert_eq!(offsets, vec![Duration::ZERO, Duration::from_millis(600)]);
}

#[tokio::test(start_paused = true)]
async fn test_loop_forever_runs_until_stopped() {
    let h = Harness::new();
    let id = h.scenario("Loop", 0, vec![click(5, 5)]);
    h.settings(
        id,
        ScenarioSettings {
            loop_forever: Some(true),
            repeat_count: Some(2),
            ..Default::default()
        },
    );

    h.engine.start(id, false).unwrap();
    settle(3_200).await;
    assert_eq!(h.automation.count("click"), 3);
    let snap = h.engine.snapshot();
    assert!(snap.is_running());
    assert_eq!(snap.loop_iteration_count, 2);

    assert!(h.engine.stop().await);
    settle(5_000).await;
    assert_eq!(h.automation.count("click"), 3);
    assert_eq!(h.engine.snapshot().phase, EnginePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_action_delay_separates_actions() {
    let h = Harness::new();
    let id = h.scenario("Two clicks", 250, vec![click(1, 1), click(2, 2)]);

    let started = Instant::now();
    h.engine.start(id, false).unwrap();
    settle(2_000).await;

    let offsets: Vec<Duration> = h.automation.times().iter().map(|t| *t - started).collect();
    assert_eq!(offsets, vec![Duration::ZERO, Duration::from_millis(250)]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_action_delay_uses_default_pause() {
    let h = Harness::new();
    let id = h.scenario("Unpaced", 0, vec![click(1, 1), click(2, 2)]);

    let started = Instant::now();
    h.engine.start(id, false).unwrap();
    settle(2_000).await;

    let offsets: Vec<Duration> = h.automation.times().iter().map(|t| *t - started).collect();
    assert_eq!(offsets, vec![Duration::ZERO, Duration::from_millis(500)]);
    assert_eq!(h.engine.snapshot().last_outcome, Some(RunOutcome::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_multi_point_click_paced_within_action() {
    let h = Harness::new();
    let id = h.scenario(
        "Path",
        0,
        vec![(
            ActionKind::MouseClick,
            json!({
                "coordinates": [{"x": 1, "y": 1}, {"x": 2, "y": 2}, {"x": 3, "y": 3}],
                "delayBetweenCoordsMs": 100,
                "delayAfterMs": 500
            }),
        ), click(9, 9)],
    );

    let started = Instant::now();
    h.engine.start(id, false).unwrap();
    settle(2_000).await;

    let offsets: Vec<Duration> = h.automation.times().iter().map(|t| *t - started).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(1200)
        ]
    );
}

// =============================================================================
// Clipboard-driven actions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_type_text_without_text_types_clipboard() {
    let h = Harness::new();
    h.clipboard.write_text("hello").await.unwrap();
    let id = h.scenario("Paste", 0, vec![type_clipboard()]);

    h.engine.start(id, false).unwrap();
    settle(1_000).await;
    assert_eq!(h.automation.calls(), vec!["type hello"]);
}

#[tokio::test(start_paused = true)]
async fn test_type_text_with_empty_clipboard_is_skipped() {
    let mut h = Harness::new();
    let id = h.scenario("Paste", 0, vec![type_clipboard(), click(1, 1)]);

    h.engine.start(id, false).unwrap();
    settle(2_000).await;

    assert_eq!(h.automation.calls(), vec!["click (1, 1)"]);
    assert_eq!(h.engine.snapshot().last_outcome, Some(RunOutcome::Completed));
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, DomainEvent::ActionSkipped { index: 0, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_read_clipboard_stores_variable() {
    let h = Harness::new();
    h.clipboard.write_text("4242").await.unwrap();
    let id = h.scenario(
        "Read",
        0,
        vec![(ActionKind::ReadClipboard, json!({ "saveToVariable": "otp" }))],
    );

    h.engine.start(id, false).unwrap();
    settle(1_000).await;
    assert_eq!(
        h.engine.snapshot().variables.get("otp").map(String::as_str),
        Some("4242")
    );
}

// =============================================================================
// Stop and failure
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_during_delay_keeps_cursor_and_skips_rest() {
    let mut h = Harness::new();
    let id = h.scenario(
        "Long",
        0,
        vec![click(1, 1), click(2, 2), delay(5_000), click(3, 3)],
    );

    h.engine.start(id, false).unwrap();
    settle(700).await;
    assert!(h.engine.stop().await);

    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::Idle);
    assert_eq!(snap.current_action_index, 2);
    assert_eq!(
        snap.last_outcome,
        Some(RunOutcome::Stopped {
            reason: StopReason::User
        })
    );

    settle(10_000).await;
    assert_eq!(h.automation.count("click"), 2);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        DomainEvent::ScenarioStopped {
            reason: StopReason::User,
            action_index: 2,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_is_noop() {
    let h = Harness::new();
    assert!(!h.engine.stop().await);
    assert_eq!(h.engine.snapshot().phase, EnginePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_action_failure_stops_run() {
    let mut h = Harness::new();
    *h.automation.fail_clicks.lock().unwrap() = true;
    let id = h.scenario("Fails", 0, vec![(ActionKind::KeyPress, json!({"key": "a"})), click(1, 1), click(2, 2)]);

    h.engine.start(id, false).unwrap();
    settle(1_000).await;

    assert_eq!(h.automation.calls(), vec!["key a"]);
    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::Idle);
    match snap.last_outcome {
        Some(RunOutcome::Failed { index, ref error, .. }) => {
            assert_eq!(index, 1);
            assert!(error.contains("input blocked"));
        }
        ref other => panic!("unexpected outcome: {other:?}"),
    }
    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::ActionFailed { index: 1, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::ScenarioStopped {
            reason: StopReason::ActionFailed,
            ..
        }
    )));
}

// =============================================================================
// Start preconditions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_rejected_while_running_quick_run_preempts() {
    let mut h = Harness::new();
    let long = h.scenario("Long", 0, vec![delay(60_000)]);
    let other = h.scenario("Other", 0, vec![click(7, 7)]);

    h.engine.start(long, false).unwrap();
    let err = h.engine.start(other, false).unwrap_err();
    assert!(matches!(err, EngineError::StateConflict(_)));

    let outcome = h.engine.quick_run(other).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Started { .. }));
    settle(1_000).await;

    assert_eq!(h.automation.calls(), vec!["click (7, 7)"]);
    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::ScenarioStopped {
            reason: StopReason::Preempted,
            ..
        }
    )));
    assert_eq!(h.engine.snapshot().last_scenario_id, Some(other));
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_automation_and_actions() {
    let h = Harness::new();
    let empty = h.scenario("Empty", 0, vec![]);
    assert!(matches!(
        h.engine.start(empty, false),
        Err(EngineError::EmptyScenario(_))
    ));
    assert!(matches!(
        h.engine.start(ScenarioId(999), false),
        Err(EngineError::Store(_))
    ));

    let id = h.scenario("Click", 0, vec![click(1, 1)]);
    h.engine.disable_automation().await;
    assert!(matches!(
        h.engine.start(id, false),
        Err(EngineError::AutomationDisabled)
    ));
    assert!(matches!(
        h.engine.quick_run(id).await,
        Err(EngineError::AutomationDisabled)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disabling_automation_stops_run() {
    let mut h = Harness::new();
    let id = h.scenario("Long", 0, vec![delay(60_000), click(1, 1)]);
    h.engine.start(id, false).unwrap();
    settle(100).await;

    h.engine.disable_automation().await;
    settle(120_000).await;
    assert!(h.automation.calls().is_empty());
    assert!(!h.engine.is_automation_enabled());
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        DomainEvent::ScenarioStopped {
            reason: StopReason::AutomationDisabled,
            ..
        }
    )));
}

// =============================================================================
// Telegram trigger
// =============================================================================

fn trigger_scenario(h: &Harness) -> ScenarioId {
    let id = h.scenario("On message", 0, vec![type_clipboard(), click(3, 3)]);
    h.settings(
        id,
        ScenarioSettings {
            trigger_by_telegram: Some(true),
            ..Default::default()
        },
    );
    id
}

#[tokio::test(start_paused = true)]
async fn test_trigger_scenario_arms_instead_of_running() {
    let h = Harness::new();
    let id = trigger_scenario(&h);

    assert_eq!(h.engine.start(id, false).unwrap(), StartOutcome::Armed);
    assert_eq!(h.engine.start(id, false).unwrap(), StartOutcome::AlreadyArmed);
    settle(5_000).await;

    assert!(h.automation.calls().is_empty());
    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::WaitingForTrigger);
    assert_eq!(snap.waiting_scenario_id, Some(id));
    assert!(h.store.get(id).unwrap().is_waiting_for_message);

    let second = trigger_scenario(&h);
    assert!(matches!(
        h.engine.start(second, false),
        Err(EngineError::StateConflict(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_queued_messages_run_in_fifo_order() {
    let h = Harness::new();
    let id = trigger_scenario(&h);
    h.engine.start(id, false).unwrap();

    let queued = h
        .engine
        .accept_messages(vec![message(1, "A"), message(2, "B"), message(3, "C")])
        .await;
    assert_eq!(queued, 3);
    settle(10_000).await;

    assert_eq!(
        h.automation.calls(),
        vec!["type A", "click (3, 3)", "type B", "click (3, 3)", "type C", "click (3, 3)"]
    );
    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::WaitingForTrigger);
    assert_eq!(snap.waiting_scenario_id, Some(id));
    assert_eq!(snap.queued_messages, 0);
    assert!(snap.current_message.is_none());
    assert_eq!(h.clipboard.current(), "");
    assert_eq!(*h.clipboard.writes.lock().unwrap(), vec!["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_messages_arriving_during_run_wait_their_turn() {
    let h = Harness::new();
    let id = h.scenario("Slow", 0, vec![type_clipboard(), delay(2_000)]);
    h.settings(
        id,
        ScenarioSettings {
            trigger_by_telegram: Some(true),
            ..Default::default()
        },
    );
    h.engine.start(id, false).unwrap();

    h.engine.accept_messages(vec![message(1, "first")]).await;
    settle(500).await;
    assert!(h.engine.snapshot().is_running());
    h.engine.accept_messages(vec![message(2, "second")]).await;
    assert_eq!(h.engine.queue_len(), 1);
    assert_eq!(h.automation.calls(), vec!["type first"]);

    settle(10_000).await;
    assert_eq!(h.automation.calls(), vec!["type first", "type second"]);
}

#[tokio::test(start_paused = true)]
async fn test_non_text_and_duplicate_messages_are_not_queued() {
    let h = Harness::new();
    let id = trigger_scenario(&h);
    h.engine.start(id, false).unwrap();

    let mut media = message(1, MEDIA_PLACEHOLDER);
    media.kind = MessageKind::Photo;
    let queued = h
        .engine
        .accept_messages(vec![media, message(2, "  ")])
        .await;
    assert_eq!(queued, 0);
    settle(1_000).await;
    assert!(h.automation.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_backlog_waits_until_scenario_armed() {
    let h = Harness::new();
    let id = trigger_scenario(&h);
    assert_eq!(h.engine.accept_messages(vec![message(1, "A")]).await, 1);
    settle(1_000).await;
    assert_eq!(h.engine.queue_len(), 1);
    assert!(h.automation.calls().is_empty());

    assert_eq!(h.engine.start(id, false).unwrap(), StartOutcome::Armed);
    h.engine.accept_messages(vec![message(2, "B")]).await;
    settle(5_000).await;

    assert_eq!(*h.clipboard.writes.lock().unwrap(), vec!["A", "B"]);
    assert_eq!(h.engine.queue_len(), 0);
    assert_eq!(h.engine.snapshot().phase, EnginePhase::WaitingForTrigger);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_triggered_run_clears_queue_and_disarms() {
    let mut h = Harness::new();
    let id = h.scenario("Slow", 0, vec![type_clipboard(), delay(5_000)]);
    h.settings(
        id,
        ScenarioSettings {
            trigger_by_telegram: Some(true),
            ..Default::default()
        },
    );
    h.engine.start(id, false).unwrap();
    h.engine
        .accept_messages(vec![message(1, "A"), message(2, "B")])
        .await;
    settle(1_000).await;
    assert_eq!(h.clipboard.current(), "A");

    assert!(h.engine.stop().await);
    settle(10_000).await;

    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::Idle);
    assert_eq!(snap.waiting_scenario_id, None);
    assert_eq!(snap.queued_messages, 0);
    assert!(snap.current_message.is_none());
    assert_eq!(h.clipboard.current(), "");
    assert_eq!(h.automation.calls(), vec!["type A"]);
    assert!(!h.store.get(id).unwrap().is_waiting_for_message);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, DomainEvent::QueueCleared { discarded: 1, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_stop_disarms_waiting_scenario() {
    let h = Harness::new();
    let id = trigger_scenario(&h);
    h.engine.start(id, false).unwrap();

    assert!(h.engine.stop().await);
    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::Idle);
    assert_eq!(snap.waiting_scenario_id, None);
    assert!(!h.store.get(id).unwrap().is_waiting_for_message);

    // Still queued, but nothing runs until a scenario is armed again.
    assert_eq!(h.engine.accept_messages(vec![message(1, "A")]).await, 1);
    settle(5_000).await;
    assert!(h.automation.calls().is_empty());
    assert_eq!(h.engine.queue_len(), 1);
    assert_eq!(h.engine.snapshot().phase, EnginePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_other_scenario_runs_while_trigger_armed() {
    let h = Harness::new();
    let trigger = trigger_scenario(&h);
    let plain = h.scenario("Plain", 0, vec![delay(1_000), click(8, 8)]);
    h.engine.start(trigger, false).unwrap();

    h.engine.start(plain, false).unwrap();
    h.engine.accept_messages(vec![message(1, "hi")]).await;
    assert_eq!(h.engine.queue_len(), 1);

    settle(10_000).await;
    assert_eq!(
        h.automation.calls(),
        vec!["click (8, 8)", "type hi", "click (3, 3)"]
    );
    assert_eq!(h.engine.snapshot().phase, EnginePhase::WaitingForTrigger);
}

#[tokio::test(start_paused = true)]
async fn test_stopping_plain_run_keeps_trigger_armed() {
    let h = Harness::new();
    let trigger = trigger_scenario(&h);
    let plain = h.scenario("Plain", 0, vec![delay(60_000), click(8, 8)]);
    h.engine.start(trigger, false).unwrap();
    h.engine.start(plain, false).unwrap();
    h.engine.accept_messages(vec![message(1, "hi")]).await;
    settle(100).await;

    assert!(h.engine.stop().await);
    let snap = h.engine.snapshot();
    assert_eq!(snap.waiting_scenario_id, Some(trigger));
    assert_eq!(snap.phase, EnginePhase::WaitingForTrigger);
    assert_eq!(snap.queued_messages, 1);
    assert!(h.store.get(trigger).unwrap().is_waiting_for_message);

    // The backlog is picked up once the retrigger pause elapses.
    settle(5_000).await;
    assert_eq!(h.automation.calls(), vec!["type hi", "click (3, 3)"]);
    assert_eq!(h.engine.queue_len(), 0);
    assert_eq!(h.engine.snapshot().waiting_scenario_id, Some(trigger));
}

#[tokio::test(start_paused = true)]
async fn test_disabling_automation_disarms_during_plain_run() {
    let h = Harness::new();
    let trigger = trigger_scenario(&h);
    let plain = h.scenario("Plain", 0, vec![delay(60_000)]);
    h.engine.start(trigger, false).unwrap();
    h.engine.start(plain, false).unwrap();
    h.engine.accept_messages(vec![message(1, "hi")]).await;

    h.engine.disable_automation().await;
    let snap = h.engine.snapshot();
    assert_eq!(snap.phase, EnginePhase::Idle);
    assert_eq!(snap.waiting_scenario_id, None);
    assert_eq!(snap.queued_messages, 0);
}
