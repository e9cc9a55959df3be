//! Input hook and host window contracts.
//!
//! The desktop shell provides the real low-level mouse/keyboard hook and the
//! window handle. [`ManualHook`] forwards events pushed by code, which the
//! CLI and tests use in place of an OS hook.

use std::sync::{Arc, Mutex};

use clickflow_core::error::ClickflowError;
use clickflow_core::types::{MouseButton, Point};

/// Keys the recorder reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Other(String),
}

/// A global input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    MouseDown { button: MouseButton, point: Point },
    KeyDown(Key),
}

/// Callback receiving hook events. May be invoked from any thread.
pub type InputSink = Arc<dyn Fn(InputEvent) + Send + Sync>;

/// A process-wide input hook. Installed at most once per process.
pub trait InputHook: Send + Sync {
    fn install(&self, sink: InputSink) -> Result<(), ClickflowError>;
}

/// The application window hidden while recording.
pub trait HostWindow: Send + Sync {
    fn minimize(&self) -> Result<(), ClickflowError>;
    fn restore_and_focus(&self) -> Result<(), ClickflowError>;
}

/// Window stand-in for headless use.
#[derive(Debug, Default)]
pub struct NoopWindow;

impl HostWindow for NoopWindow {
    fn minimize(&self) -> Result<(), ClickflowError> {
        tracing::debug!("minimize requested (no host window)");
        Ok(())
    }

    fn restore_and_focus(&self) -> Result<(), ClickflowError> {
        tracing::debug!("restore requested (no host window)");
        Ok(())
    }
}

/// Hook whose events are pushed programmatically.
#[derive(Default)]
pub struct ManualHook {
    sink: Mutex<Option<InputSink>>,
    installs: Mutex<usize>,
}

impl ManualHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the installed sink. Returns false if none.
    pub fn emit(&self, event: InputEvent) -> bool {
        let sink = match self.sink.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }

    /// Number of times `install` was called.
    pub fn install_count(&self) -> usize {
        self.installs.lock().map(|n| *n).unwrap_or(0)
    }
}

impl InputHook for ManualHook {
    fn install(&self, sink: InputSink) -> Result<(), ClickflowError> {
        let mut slot = self
            .sink
            .lock()
            .map_err(|e| ClickflowError::Recorder(format!("Hook mutex poisoned: {}", e)))?;
        *slot = Some(sink);
        if let Ok(mut n) = self.installs.lock() {
            *n += 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ManualHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualHook")
            .field("installs", &self.install_count())
            .finish()
    }
}
