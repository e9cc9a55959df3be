//! `TelegramSender` backed by the Bot API client.

use std::path::Path;

use async_trait::async_trait;

use clickflow_action::{AdapterError, TelegramSender};

use crate::client::TelegramClient;

pub struct BotSender {
    client: TelegramClient,
    default_chat_id: Option<String>,
}

impl BotSender {
    pub fn new(client: TelegramClient, default_chat_id: Option<String>) -> Self {
        Self {
            client,
            default_chat_id,
        }
    }
}

#[async_trait]
impl TelegramSender for BotSender {
    fn default_chat_id(&self) -> Option<String> {
        self.default_chat_id.clone()
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), AdapterError> {
        let sent = self.client.send_message(chat_id, text, None).await?;
        tracing::info!(chat_id, message_id = sent.message_id, "Telegram message sent");
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), AdapterError> {
        let sent = self.client.send_photo(chat_id, path, caption).await?;
        tracing::info!(chat_id, message_id = sent.message_id, path = %path.display(), "Telegram photo sent");
        Ok(())
    }
}
