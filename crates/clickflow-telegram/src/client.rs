//! Minimal Bot API client over reqwest.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::TelegramError;
use crate::types::{ApiResponse, Chat, Message, Update, User};

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    /// `request_timeout` must exceed the long-poll timeout used with
    /// `get_updates`.
    pub fn new(base_url: &str, token: &str, request_timeout: Duration) -> Result<Self, TelegramError> {
        if token.trim().is_empty() {
            return Err(TelegramError::NotConfigured("bot token is empty".into()));
        }
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn parse<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, TelegramError> {
        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await?;
        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Api {
                method: method.to_string(),
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("request failed with status {status}")),
            }),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TelegramError> {
        tracing::debug!(method, "Telegram API call");
        let response = self.http.post(self.url(method)).json(body).send().await?;
        Self::parse(method, response).await
    }

    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &json!({})).await
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat, TelegramError> {
        self.call("getChat", &json!({ "chat_id": chat_id })).await
    }

    /// Send an HTML-formatted message, optionally as a reply.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<Message, TelegramError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(reply_to) = reply_to_message_id {
            body["reply_to_message_id"] = json!(reply_to);
        }
        self.call("sendMessage", &body).await
    }

    /// Upload a local image file.
    pub async fn send_photo(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<Message, TelegramError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.png".to_string());
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", Part::bytes(bytes).file_name(file_name));
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            form = form.text("caption", caption.to_string());
        }
        tracing::debug!(method = "sendPhoto", path = %path.display(), "Telegram API call");
        let response = self
            .http
            .post(self.url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;
        Self::parse("sendPhoto", response).await
    }

    /// Long-poll for updates with id >= `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        limit: u32,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "limit": limit,
                "timeout": timeout_secs,
            }),
        )
        .await
    }
}
