//! Clickflow Recorder crate - coordinate capture from a global input hook.
//!
//! A [`RecorderSession`] arms a process-wide mouse/keyboard hook, collects
//! primary-button click positions (dropping near-duplicates) until it is
//! stopped or the user presses Enter, then hands the points back for
//! storage in an action's `coordinates` parameter.

pub mod hook;
pub mod session;
pub mod state;

pub use hook::{HostWindow, InputEvent, InputHook, InputSink, Key, ManualHook, NoopWindow};
pub use session::{coordinates_parameter, CaptureMode, RecorderSession};
pub use state::RecorderState;
