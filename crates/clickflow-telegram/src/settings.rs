//! Bot credentials, notification toggles and the connection test.

use serde::{Deserialize, Serialize};

use clickflow_core::config::TelegramConfig;
use clickflow_storage::{keys, load_json, save_json, KeyValueStore};

use crate::client::TelegramClient;
use crate::error::TelegramError;

pub const DEFAULT_BOT_NAME: &str = "My Automation Bot";

/// Which engine events are forwarded to the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub automation_start: bool,
    pub automation_stop: bool,
    pub scenario_complete: bool,
    pub scenario_error: bool,
    pub include_screenshots: bool,
    pub hourly_summary: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            automation_start: true,
            automation_stop: true,
            scenario_complete: true,
            scenario_error: true,
            include_screenshots: false,
            hourly_summary: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub bot_name: String,
    /// Set by a successful connection test.
    pub connected: bool,
    pub notifications: NotificationSettings,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            bot_name: DEFAULT_BOT_NAME.to_string(),
            connected: false,
            notifications: NotificationSettings::default(),
        }
    }
}

impl TelegramSettings {
    pub fn load(kv: &dyn KeyValueStore) -> Result<Self, TelegramError> {
        Ok(load_json(kv, keys::TELEGRAM_SETTINGS)?.unwrap_or_default())
    }

    pub fn save(&self, kv: &dyn KeyValueStore) -> Result<(), TelegramError> {
        save_json(kv, keys::TELEGRAM_SETTINGS, self)?;
        Ok(())
    }

    pub fn has_token(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }

    pub fn chat_id(&self) -> Option<String> {
        let chat = self.chat_id.trim();
        (!chat.is_empty()).then(|| chat.to_string())
    }

    /// Numeric chat id for filtering updates.
    pub fn chat_filter(&self) -> Option<i64> {
        self.chat_id().and_then(|c| c.parse().ok())
    }

    /// Replace credentials. Changing them invalidates the last connection test.
    pub fn set_credentials(&mut self, bot_token: &str, chat_id: &str) {
        if self.bot_token != bot_token.trim() || self.chat_id != chat_id.trim() {
            self.connected = false;
        }
        self.bot_token = bot_token.trim().to_string();
        self.chat_id = chat_id.trim().to_string();
    }

    pub fn client(&self, config: &TelegramConfig) -> Result<TelegramClient, TelegramError> {
        TelegramClient::new(
            &config.api_base_url,
            &self.bot_token,
            std::time::Duration::from_secs(config.request_timeout_secs),
        )
    }
}

/// Result of a successful connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub bot_name: String,
    pub username: Option<String>,
}

/// Check the token with `getMe` and chat access with `getChat`. On success
/// the settings are marked connected; on failure, disconnected.
pub async fn test_connection(
    settings: &mut TelegramSettings,
    config: &TelegramConfig,
) -> Result<ConnectionInfo, TelegramError> {
    let result = check_bot(settings, config).await;
    settings.connected = result.is_ok();
    match &result {
        Ok(info) => tracing::info!(bot = %info.bot_name, "Telegram connection verified"),
        Err(e) => tracing::warn!(error = %e, "Telegram connection test failed"),
    }
    result
}

async fn check_bot(
    settings: &TelegramSettings,
    config: &TelegramConfig,
) -> Result<ConnectionInfo, TelegramError> {
    let chat_id = settings
        .chat_id()
        .ok_or_else(|| TelegramError::NotConfigured("chat id is empty".into()))?;
    let client = settings.client(config)?;
    let me = client.get_me().await?;
    client
        .get_chat(&chat_id)
        .await
        .map_err(|e| TelegramError::ChatUnavailable {
            chat_id: chat_id.clone(),
            description: e.to_string(),
        })?;
    Ok(ConnectionInfo {
        bot_name: me.first_name,
        username: me.username,
    })
}
