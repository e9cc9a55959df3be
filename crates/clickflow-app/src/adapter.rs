//! Headless adapters for the CLI.
//!
//! The desktop shell supplies real input and screen primitives. The binary
//! logs each primitive instead and keeps the clipboard in memory, which is
//! enough to exercise scenarios, Telegram triggers and notifications.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use clickflow_action::{AdapterError, AutomationAdapter, ClipboardAdapter};
use clickflow_core::types::{MouseButton, MovementSpeed, Point, Region, Rgb};

/// Logs every primitive and reports success.
#[derive(Debug, Default)]
pub struct DryRunAutomation;

#[async_trait]
impl AutomationAdapter for DryRunAutomation {
    async fn move_mouse(&self, point: Point, speed: MovementSpeed) -> Result<(), AdapterError> {
        info!(%point, %speed, "move mouse");
        Ok(())
    }

    async fn click(&self, point: Point, button: MouseButton, count: u8) -> Result<(), AdapterError> {
        info!(%point, %button, count, "click");
        Ok(())
    }

    async fn type_text(&self, text: &str, delay_per_char_ms: u64) -> Result<(), AdapterError> {
        info!(chars = text.chars().count(), delay_per_char_ms, "type text");
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), AdapterError> {
        info!(key, "press key");
        Ok(())
    }

    async fn press_hotkey(&self, keys: &[String]) -> Result<(), AdapterError> {
        info!(keys = %keys.join("+"), "press hotkey");
        Ok(())
    }

    async fn launch_app(&self, executable: &str, args: &[String]) -> Result<(), AdapterError> {
        info!(executable, ?args, "launch app");
        Ok(())
    }

    async fn activate_window(
        &self,
        title_contains: Option<&str>,
        process_name: Option<&str>,
    ) -> Result<(), AdapterError> {
        info!(?title_contains, ?process_name, "activate window");
        Ok(())
    }

    /// Always black.
    async fn read_pixel(&self, point: Point) -> Result<Rgb, AdapterError> {
        info!(%point, "read pixel");
        Ok(Rgb::new(0, 0, 0))
    }

    async fn capture_region(&self, region: Region, path: &Path) -> Result<(), AdapterError> {
        info!(?region, path = %path.display(), "capture region");
        tokio::fs::write(path, b"").await?;
        Ok(())
    }

    async fn capture_fullscreen(&self, path: &Path) -> Result<(), AdapterError> {
        info!(path = %path.display(), "capture fullscreen");
        tokio::fs::write(path, b"").await?;
        Ok(())
    }
}

/// Process-local text clipboard.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    text: Mutex<String>,
}

impl MemoryClipboard {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, String>, AdapterError> {
        self.text
            .lock()
            .map_err(|_| AdapterError::Clipboard("clipboard lock poisoned".into()))
    }
}

#[async_trait]
impl ClipboardAdapter for MemoryClipboard {
    async fn read_text(&self) -> Result<String, AdapterError> {
        Ok(self.lock()?.clone())
    }

    async fn write_text(&self, text: &str) -> Result<(), AdapterError> {
        *self.lock()? = text.to_string();
        Ok(())
    }

    async fn clear(&self) -> Result<(), AdapterError> {
        self.lock()?.clear();
        Ok(())
    }
}
