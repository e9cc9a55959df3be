//! Recording session lifecycle.
//!
//! The hook is installed the first time a session starts and stays in place
//! for the life of the process; starting and stopping only flip the armed
//! state, so hook callbacks arriving while idle are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use uuid::Uuid;

use clickflow_core::config::RecorderConfig;
use clickflow_core::error::ClickflowError;
use clickflow_core::events::{DomainEvent, EventSender};
use clickflow_core::types::{MouseButton, Point, Timestamp};

use crate::hook::{HostWindow, InputEvent, InputHook, InputSink, Key};
use crate::state::{RecorderState, StateMachine};

/// How captured points map onto an action's `coordinates` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Every captured point, in order.
    Multi,
    /// Only the last captured point.
    Single,
}

/// Encode points as the JSON text stored in `parameters.coordinates`.
///
/// Returns `None` when there is nothing to store.
pub fn coordinates_parameter(points: &[Point], mode: CaptureMode) -> Option<Value> {
    let encoded = match mode {
        CaptureMode::Multi if !points.is_empty() => serde_json::to_string(points).ok()?,
        CaptureMode::Single => serde_json::to_string(points.last()?).ok()?,
        CaptureMode::Multi => return None,
    };
    Some(Value::String(encoded))
}

#[derive(Debug, Default)]
struct Capture {
    session_id: Option<Uuid>,
    points: Vec<Point>,
}

/// Owns the recorder's hook registration, armed flag and point buffer.
pub struct RecorderSession {
    state_machine: StateMachine,
    hook: Arc<dyn InputHook>,
    window: Arc<dyn HostWindow>,
    hook_installed: AtomicBool,
    capture: Mutex<Capture>,
    events: EventSender,
    config: RecorderConfig,
}

impl RecorderSession {
    pub fn new(
        hook: Arc<dyn InputHook>,
        window: Arc<dyn HostWindow>,
        events: EventSender,
        config: RecorderConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state_machine: StateMachine::new(),
            hook,
            window,
            hook_installed: AtomicBool::new(false),
            capture: Mutex::new(Capture::default()),
            events,
            config,
        })
    }

    fn capture(&self) -> Result<MutexGuard<'_, Capture>, ClickflowError> {
        self.capture
            .lock()
            .map_err(|e| ClickflowError::Recorder(format!("Capture mutex poisoned: {}", e)))
    }

    pub fn state(&self) -> RecorderState {
        self.state_machine.current()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Armed
    }

    /// Points captured so far in the current session.
    pub fn points(&self) -> Vec<Point> {
        self.capture().map(|c| c.points.clone()).unwrap_or_default()
    }

    pub fn captured_count(&self) -> usize {
        self.capture().map(|c| c.points.len()).unwrap_or(0)
    }

    /// Arm the recorder. Idempotent: returns the current session id when
    /// already recording. The capture lock is held from the check to the
    /// transition, so concurrent callers share one session.
    pub fn start(self: &Arc<Self>) -> Result<Uuid, ClickflowError> {
        let session_id = {
            let mut capture = self.capture()?;
            if self.is_recording() {
                if let Some(id) = capture.session_id {
                    return Ok(id);
                }
            }

            if !self.hook_installed.load(Ordering::SeqCst) {
                let weak: Weak<Self> = Arc::downgrade(self);
                let sink: InputSink = Arc::new(move |event| {
                    if let Some(session) = weak.upgrade() {
                        session.handle_event(event);
                    }
                });
                self.hook.install(sink)?;
                self.hook_installed.store(true, Ordering::SeqCst);
                tracing::info!("Global input hook installed");
            }

            self.state_machine.transition(RecorderState::Armed)?;
            let session_id = Uuid::new_v4();
            capture.session_id = Some(session_id);
            capture.points.clear();
            session_id
        };

        if self.config.minimize_on_start {
            if let Err(e) = self.window.minimize() {
                tracing::warn!(error = %e, "Failed to minimize window for recording");
            }
        }

        tracing::info!(session_id = %session_id, "Coordinate recording started");
        let _ = self.events.send(DomainEvent::RecordingStarted {
            session_id,
            timestamp: Timestamp::now(),
        });
        Ok(session_id)
    }

    /// End the session and return the captured points.
    pub fn stop(&self) -> Result<Vec<Point>, ClickflowError> {
        self.finish(false)
    }

    /// Discard captured points without ending the session.
    pub fn clear(&self) -> Result<(), ClickflowError> {
        let mut capture = self.capture()?;
        let dropped = capture.points.len();
        capture.points.clear();
        tracing::debug!(dropped, "Captured points cleared");
        Ok(())
    }

    /// Entry point for hook callbacks.
    pub fn handle_event(&self, event: InputEvent) {
        if !self.is_recording() {
            return;
        }
        match event {
            InputEvent::MouseDown {
                button: MouseButton::Left,
                point,
            } => self.record_point(point),
            InputEvent::KeyDown(Key::Enter) => {
                if let Err(e) = self.finish(true) {
                    tracing::warn!(error = %e, "Failed to finish recording on Enter");
                }
            }
            _ => {}
        }
    }

    fn record_point(&self, point: Point) {
        let (session_id, count) = {
            let mut capture = match self.capture() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping captured point");
                    return;
                }
            };
            if let Some(last) = capture.points.last() {
                if last.is_near(&point, self.config.dedup_threshold_px) {
                    tracing::trace!(%point, "Ignoring near-duplicate click");
                    return;
                }
            }
            capture.points.push(point);
            (capture.session_id.unwrap_or_default(), capture.points.len())
        };

        tracing::debug!(%point, count, "Coordinate captured");
        let _ = self.events.send(DomainEvent::CoordinateCaptured {
            session_id,
            point,
            count,
            timestamp: Timestamp::now(),
        });
    }

    fn finish(&self, by_enter_key: bool) -> Result<Vec<Point>, ClickflowError> {
        self.state_machine.transition(RecorderState::Idle)?;
        let (session_id, points) = {
            let mut capture = self.capture()?;
            (
                capture.session_id.take().unwrap_or_default(),
                std::mem::take(&mut capture.points),
            )
        };

        if let Err(e) = self.window.restore_and_focus() {
            tracing::warn!(error = %e, "Failed to restore window after recording");
        }

        tracing::info!(
            session_id = %session_id,
            points = points.len(),
            by_enter_key,
            "Coordinate recording stopped"
        );
        let _ = self.events.send(DomainEvent::RecordingStopped {
            session_id,
            points: points.clone(),
            by_enter_key,
            timestamp: Timestamp::now(),
        });
        Ok(points)
    }
}

impl std::fmt::Debug for RecorderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderSession")
            .field("state", &self.state())
            .field("captured", &self.captured_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::ManualHook;
    use clickflow_core::events::event_channel;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingWindow {
        minimized: AtomicUsize,
        restored: AtomicUsize,
    }

    impl HostWindow for CountingWindow {
        fn minimize(&self) -> Result<(), ClickflowError> {
            self.minimized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn restore_and_focus(&self) -> Result<(), ClickflowError> {
            self.restored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    impl InputHook for FailingHook {
        fn install(&self, _sink: InputSink) -> Result<(), ClickflowError> {
            Err(ClickflowError::Recorder("access denied".into()))
        }
    }

    fn setup() -> (Arc<ManualHook>, Arc<CountingWindow>, Arc<RecorderSession>, EventSender) {
        let hook = Arc::new(ManualHook::new());
        let window = Arc::new(CountingWindow::default());
        let events = event_channel();
        let session = RecorderSession::new(
            hook.clone(),
            window.clone(),
            events.clone(),
            RecorderConfig::default(),
        );
        (hook, window, session, events)
    }

    fn click(hook: &ManualHook, x: i32, y: i32) {
        hook.emit(InputEvent::MouseDown {
            button: MouseButton::Left,
            point: Point::new(x, y),
        });
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn test_start_installs_hook_once() {
        let (hook, window, session, _events) = setup();
        let first = session.start().unwrap();
        let again = session.start().unwrap();
        assert_eq!(first, again);
        session.stop().unwrap();
        session.start().unwrap();

        assert_eq!(hook.install_count(), 1);
        assert_eq!(window.minimized.load(Ordering::SeqCst), 2);
        assert_eq!(window.restored.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_starts_share_one_session() {
        for _ in 0..50 {
            let (hook, window, session, _events) = setup();
            let barrier = Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let session = Arc::clone(&session);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        session.start()
                    })
                })
                .collect();
            let ids: Vec<Uuid> = handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect();

            assert_eq!(ids[0], ids[1]);
            assert!(session.is_recording());
            assert_eq!(hook.install_count(), 1);
            assert_eq!(window.minimized.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_stop_returns_points_and_clears_buffer() {
        let (hook, window, session, _events) = setup();
        session.start().unwrap();
        click(&hook, 10, 10);
        click(&hook, 200, 300);
        let points = session.stop().unwrap();
        assert_eq!(points, vec![Point::new(10, 10), Point::new(200, 300)]);
        assert_eq!(session.captured_count(), 0);
        assert!(!session.is_recording());
        assert_eq!(window.restored.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_when_idle_errors() {
        let (_hook, _window, session, _events) = setup();
        assert!(session.stop().is_err());
    }

    #[test]
    fn test_events_ignored_while_idle() {
        let (hook, _window, session, _events) = setup();
        session.start().unwrap();
        session.stop().unwrap();
        click(&hook, 5, 5);
        assert_eq!(session.captured_count(), 0);
    }

    #[test]
    fn test_hook_failure_leaves_recorder_idle() {
        let session = RecorderSession::new(
            Arc::new(FailingHook),
            Arc::new(CountingWindow::default()),
            event_channel(),
            RecorderConfig::default(),
        );
        assert!(session.start().is_err());
        assert!(!session.is_recording());
    }

    #[test]
    fn test_minimize_disabled() {
        let hook = Arc::new(ManualHook::new());
        let window = Arc::new(CountingWindow::default());
        let config = RecorderConfig {
            minimize_on_start: false,
            ..Default::default()
        };
        let session = RecorderSession::new(hook, window.clone(), event_channel(), config);
        session.start().unwrap();
        assert_eq!(window.minimized.load(Ordering::SeqCst), 0);
    }

    // =========================================================================
    // Capture
    // =========================================================================

    #[test]
    fn test_near_duplicates_collapse() {
        let (hook, _window, session, _events) = setup();
        session.start().unwrap();
        click(&hook, 100, 100);
        click(&hook, 105, 95);
        click(&hook, 110, 110);
        click(&hook, 111, 110);
        click(&hook, 100, 100);
        assert_eq!(
            session.points(),
            vec![Point::new(100, 100), Point::new(111, 110), Point::new(100, 100)]
        );
    }

    #[test]
    fn test_non_primary_buttons_ignored() {
        let (hook, _window, session, _events) = setup();
        session.start().unwrap();
        hook.emit(InputEvent::MouseDown {
            button: MouseButton::Right,
            point: Point::new(1, 1),
        });
        hook.emit(InputEvent::KeyDown(Key::Escape));
        assert_eq!(session.captured_count(), 0);
        assert!(session.is_recording());
    }

    #[test]
    fn test_enter_key_ends_session_with_points() {
        let (hook, window, session, events) = setup();
        let mut rx = events.subscribe();
        session.start().unwrap();
        click(&hook, 1, 1);
        click(&hook, 50, 50);
        hook.emit(InputEvent::KeyDown(Key::Enter));

        assert!(!session.is_recording());
        assert_eq!(window.restored.load(Ordering::SeqCst), 1);

        let mut captured = 0;
        let mut stopped = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                DomainEvent::CoordinateCaptured { count, .. } => captured = count,
                DomainEvent::RecordingStopped {
                    points,
                    by_enter_key,
                    ..
                } => stopped = Some((points, by_enter_key)),
                _ => {}
            }
        }
        assert_eq!(captured, 2);
        let (points, by_enter) = stopped.expect("recording_stopped event");
        assert!(by_enter);
        assert_eq!(points, vec![Point::new(1, 1), Point::new(50, 50)]);
    }

    #[test]
    fn test_clear_keeps_session_armed() {
        let (hook, _window, session, _events) = setup();
        session.start().unwrap();
        click(&hook, 1, 1);
        session.clear().unwrap();
        assert!(session.is_recording());
        click(&hook, 2, 2);
        assert_eq!(session.points(), vec![Point::new(2, 2)]);
    }

    // =========================================================================
    // Parameter encoding
    // =========================================================================

    #[test]
    fn test_coordinates_parameter() {
        let points = vec![Point::new(1, 2), Point::new(3, 4)];
        assert_eq!(
            coordinates_parameter(&points, CaptureMode::Multi),
            Some(Value::String(r#"[{"x":1,"y":2},{"x":3,"y":4}]"#.into()))
        );
        assert_eq!(
            coordinates_parameter(&points, CaptureMode::Single),
            Some(Value::String(r#"{"x":3,"y":4}"#.into()))
        );
        assert_eq!(coordinates_parameter(&[], CaptureMode::Multi), None);
        assert_eq!(coordinates_parameter(&[], CaptureMode::Single), None);
    }
}
