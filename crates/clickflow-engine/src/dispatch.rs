//! Executes a single validated action against the platform adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use clickflow_action::{
    ActionParams, AdapterError, AutomationAdapter, ClipboardAdapter, PointerPath, TelegramPayload,
    TelegramSender,
};
use clickflow_core::config::EngineConfig;
use clickflow_core::types::{MovementSpeed, Point, Rgb};

/// Platform collaborators handed to the engine.
#[derive(Clone)]
pub struct Adapters {
    pub automation: Arc<dyn AutomationAdapter>,
    pub clipboard: Arc<dyn ClipboardAdapter>,
    pub telegram: Option<Arc<dyn TelegramSender>>,
    /// Where screenshots without an explicit path are written.
    pub screenshots_dir: PathBuf,
}

/// Result of an action that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    /// Nothing was done; the run continues.
    Skipped(String),
    /// A wait ended. `matched` is false on timeout.
    Waited { matched: bool },
    /// A value to store in the run's variables.
    Captured { variable: String, value: String },
}

pub(crate) struct Dispatcher {
    adapters: Adapters,
    coordinate_delay_ms: u64,
    poll_interval: Duration,
}

impl Dispatcher {
    pub(crate) fn new(adapters: Adapters, config: &EngineConfig) -> Self {
        Self {
            adapters,
            coordinate_delay_ms: config.coordinate_delay_ms,
            poll_interval: Duration::from_millis(config.wait_poll_interval_ms.max(1)),
        }
    }

    pub(crate) fn clipboard(&self) -> &Arc<dyn ClipboardAdapter> {
        &self.adapters.clipboard
    }

    /// Run one action to completion. Callers race this against cancellation.
    pub(crate) async fn execute(
        &self,
        params: &ActionParams,
        speed: MovementSpeed,
    ) -> Result<ActionOutcome, AdapterError> {
        let automation = &self.adapters.automation;
        let clipboard = &self.adapters.clipboard;

        match params {
            ActionParams::Delay { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
            }
            ActionParams::If { condition } => {
                tracing::debug!(condition = %condition, "Condition marker reached");
            }
            ActionParams::Loop { count, .. } => {
                tracing::debug!(count = ?count, "Loop marker reached");
            }
            ActionParams::LaunchApp {
                executable_path,
                arguments,
            } => {
                automation.launch_app(executable_path, arguments).await?;
            }
            ActionParams::ActivateWindow {
                title_contains,
                process_name,
            } => {
                automation
                    .activate_window(title_contains.as_deref(), process_name.as_deref())
                    .await?;
            }
            ActionParams::MouseMove { path } => {
                self.walk(path, |point| automation.move_mouse(point, speed))
                    .await?;
            }
            ActionParams::MouseClick {
                path,
                button,
                click_count,
            } => {
                self.walk(path, |point| automation.click(point, *button, *click_count))
                    .await?;
            }
            ActionParams::TypeText {
                text,
                delay_per_char_ms,
            } => {
                let text = match text {
                    Some(text) => text.clone(),
                    None => match clipboard.read_text().await {
                        Ok(contents) if !contents.trim().is_empty() => contents,
                        Ok(_) => return Ok(ActionOutcome::Skipped("clipboard is empty".into())),
                        Err(e) => {
                            return Ok(ActionOutcome::Skipped(format!(
                                "clipboard unreadable: {e}"
                            )))
                        }
                    },
                };
                automation.type_text(&text, *delay_per_char_ms).await?;
            }
            ActionParams::KeyPress { key } => {
                automation.press_key(key).await?;
            }
            ActionParams::Hotkey { keys } => {
                automation.press_hotkey(keys).await?;
            }
            ActionParams::SetClipboard { text } => {
                clipboard.write_text(text).await?;
            }
            ActionParams::ReadClipboard { variable } => {
                let value = clipboard.read_text().await?;
                return Ok(ActionOutcome::Captured {
                    variable: variable.clone(),
                    value,
                });
            }
            ActionParams::WaitUntilClipboardChanges { timeout_ms } => {
                let matched = self.wait_for_clipboard_change(*timeout_ms).await?;
                return Ok(ActionOutcome::Waited { matched });
            }
            ActionParams::WaitUntilPixelColor {
                point,
                color,
                timeout_ms,
            } => {
                let matched = self.wait_for_pixel(*point, *color, *timeout_ms).await?;
                return Ok(ActionOutcome::Waited { matched });
            }
            ActionParams::ScreenshotRegion { region, save_path } => {
                let path = match save_path {
                    Some(p) => PathBuf::from(p),
                    None => self.auto_screenshot_path(),
                };
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                match region {
                    Some(region) => automation.capture_region(*region, &path).await?,
                    None => automation.capture_fullscreen(&path).await?,
                }
                clipboard.write_text(&path.to_string_lossy()).await?;
                tracing::info!(path = %path.display(), "Screenshot saved");
            }
            ActionParams::SendMessageToTele {
                payload,
                chat_id,
                text,
                caption,
            } => {
                self.send_telegram(*payload, chat_id.as_deref(), text.as_deref(), caption.as_deref())
                    .await?;
            }
        }
        Ok(ActionOutcome::Done)
    }

    /// Visit every point of a path, pausing between points but not after
    /// the last, then pause once more after the whole path.
    async fn walk<F, Fut>(&self, path: &PointerPath, mut visit: F) -> Result<(), AdapterError>
    where
        F: FnMut(Point) -> Fut,
        Fut: std::future::Future<Output = Result<(), AdapterError>>,
    {
        let between = path.delay_between_ms.unwrap_or(self.coordinate_delay_ms);
        for (i, point) in path.points.iter().enumerate() {
            if i > 0 && between > 0 {
                tokio::time::sleep(Duration::from_millis(between)).await;
            }
            visit(*point).await?;
        }
        if path.delay_after_ms > 0 {
            tokio::time::sleep(Duration::from_millis(path.delay_after_ms)).await;
        }
        Ok(())
    }

    async fn wait_for_clipboard_change(&self, timeout_ms: u64) -> Result<bool, AdapterError> {
        let clipboard = &self.adapters.clipboard;
        let initial = clipboard.read_text().await.unwrap_or_default();
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match clipboard.read_text().await {
                Ok(current) if current != initial => return Ok(true),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Clipboard read failed while waiting"),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    async fn wait_for_pixel(
        &self,
        point: Point,
        target: Rgb,
        timeout_ms: u64,
    ) -> Result<bool, AdapterError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let color = self.adapters.automation.read_pixel(point).await?;
            if color == target {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::debug!(point = %point, expected = %target.to_hex(), actual = %color.to_hex(), "Pixel wait timed out");
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn auto_screenshot_path(&self) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.adapters
            .screenshots_dir
            .join(format!("screenshot-{millis}.png"))
    }

    async fn send_telegram(
        &self,
        payload: TelegramPayload,
        chat_id: Option<&str>,
        text: Option<&str>,
        caption: Option<&str>,
    ) -> Result<(), AdapterError> {
        let sender = self
            .adapters
            .telegram
            .as_ref()
            .ok_or_else(|| AdapterError::Delivery("Telegram is not configured".into()))?;
        let chat_id = chat_id
            .map(str::to_string)
            .or_else(|| sender.default_chat_id())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AdapterError::Delivery("no chat id configured".into()))?;

        match payload {
            TelegramPayload::Text => {
                let body = match text.filter(|t| !t.trim().is_empty()) {
                    Some(t) => t.to_string(),
                    None => self.adapters.clipboard.read_text().await.unwrap_or_default(),
                };
                if body.trim().is_empty() {
                    return Err(AdapterError::Delivery(
                        "no text to send: text is empty and the clipboard is empty".into(),
                    ));
                }
                sender.send_text(&chat_id, &body).await
            }
            TelegramPayload::Photo => {
                let raw = self.adapters.clipboard.read_text().await?;
                let path = Path::new(raw.trim());
                if raw.trim().is_empty() || !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(AdapterError::Delivery(format!(
                        "photo file not found: '{}'",
                        raw.trim()
                    )));
                }
                sender.send_photo(&chat_id, path, caption).await
            }
        }
    }
}
