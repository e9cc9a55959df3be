//! Forwards selected engine events to the configured chat.

use std::sync::Arc;

use tokio::sync::broadcast;

use clickflow_action::TelegramSender;
use clickflow_core::events::DomainEvent;

use crate::settings::{NotificationSettings, TelegramSettings};

pub struct Notifier {
    sender: Arc<dyn TelegramSender>,
    chat_id: String,
    toggles: NotificationSettings,
}

impl Notifier {
    /// `None` unless the settings passed a connection test and name a chat.
    pub fn from_settings(settings: &TelegramSettings, sender: Arc<dyn TelegramSender>) -> Option<Self> {
        if !settings.connected {
            return None;
        }
        let chat_id = settings.chat_id()?;
        Some(Self {
            sender,
            chat_id,
            toggles: settings.notifications.clone(),
        })
    }

    /// Notification text for an event, or `None` if it is not forwarded.
    pub fn message_for(event: &DomainEvent, toggles: &NotificationSettings) -> Option<String> {
        match event {
            DomainEvent::AutomationEnabled { .. } if toggles.automation_start => {
                Some("🚀 <b>Automation started</b>".to_string())
            }
            DomainEvent::AutomationDisabled { .. } if toggles.automation_stop => {
                Some("⏹ <b>Automation stopped</b>".to_string())
            }
            DomainEvent::ScenarioCompleted { name, .. } if toggles.scenario_complete => Some(format!(
                "✅ <b>Scenario completed</b>\n{}",
                escape_html(name)
            )),
            DomainEvent::ActionFailed { name, error, index, .. } if toggles.scenario_error => {
                Some(format!(
                    "❌ <b>Scenario error</b>\nAction {} ({}): {}",
                    index + 1,
                    escape_html(name),
                    escape_html(error)
                ))
            }
            _ => None,
        }
    }

    /// Forward events until the channel closes. Delivery failures are logged.
    pub async fn run(&self, mut events: broadcast::Receiver<DomainEvent>) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notifier lagged behind event stream");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(text) = Self::message_for(&event, &self.toggles) else {
                continue;
            };
            if let Err(e) = self.sender.send_text(&self.chat_id, &text).await {
                tracing::warn!(event = event.event_name(), error = %e, "Failed to send notification");
            }
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
