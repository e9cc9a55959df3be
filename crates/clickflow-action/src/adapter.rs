//! Contracts for the platform collaborators the engine drives.
//!
//! Implementations live outside the engine: the desktop shell binds real
//! mouse/keyboard/screen primitives, the binary ships logging stand-ins,
//! and tests use recording fakes.

use std::path::Path;

use async_trait::async_trait;

use clickflow_core::types::{MouseButton, MovementSpeed, Point, Region, Rgb};

use crate::error::AdapterError;

/// Mouse, keyboard, window and screen primitives.
#[async_trait]
pub trait AutomationAdapter: Send + Sync {
    async fn move_mouse(&self, point: Point, speed: MovementSpeed) -> Result<(), AdapterError>;

    async fn click(&self, point: Point, button: MouseButton, count: u8)
        -> Result<(), AdapterError>;

    async fn type_text(&self, text: &str, delay_per_char_ms: u64) -> Result<(), AdapterError>;

    async fn press_key(&self, key: &str) -> Result<(), AdapterError>;

    /// Press all keys together, release in reverse order.
    async fn press_hotkey(&self, keys: &[String]) -> Result<(), AdapterError>;

    async fn launch_app(&self, executable: &str, args: &[String]) -> Result<(), AdapterError>;

    async fn activate_window(
        &self,
        title_contains: Option<&str>,
        process_name: Option<&str>,
    ) -> Result<(), AdapterError>;

    async fn read_pixel(&self, point: Point) -> Result<Rgb, AdapterError>;

    async fn capture_region(&self, region: Region, path: &Path) -> Result<(), AdapterError>;

    async fn capture_fullscreen(&self, path: &Path) -> Result<(), AdapterError>;
}

/// System clipboard, text only.
#[async_trait]
pub trait ClipboardAdapter: Send + Sync {
    async fn read_text(&self) -> Result<String, AdapterError>;

    async fn write_text(&self, text: &str) -> Result<(), AdapterError>;

    async fn clear(&self) -> Result<(), AdapterError>;
}

/// Outbound chat messages.
#[async_trait]
pub trait TelegramSender: Send + Sync {
    /// Chat used when an action does not name one.
    fn default_chat_id(&self) -> Option<String>;

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), AdapterError>;

    async fn send_photo(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), AdapterError>;
}
