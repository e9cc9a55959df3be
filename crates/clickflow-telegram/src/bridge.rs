//! Update polling loop feeding the history and the engine's trigger queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use clickflow_core::config::TelegramConfig;
use clickflow_core::types::InboundMessage;
use clickflow_engine::ScenarioEngine;

use crate::client::TelegramClient;
use crate::error::TelegramError;
use crate::history::MessageHistory;
use crate::types::Update;

/// Where updates come from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch(
        &self,
        offset: i64,
        limit: u32,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn fetch(
        &self,
        offset: i64,
        limit: u32,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        self.get_updates(offset, limit, timeout_secs).await
    }
}

/// Where converted messages go. Returns how many were queued.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn accept_messages(&self, messages: Vec<InboundMessage>) -> usize;
}

#[async_trait]
impl MessageSink for ScenarioEngine {
    async fn accept_messages(&self, messages: Vec<InboundMessage>) -> usize {
        ScenarioEngine::accept_messages(self, messages).await
    }
}

pub struct TelegramBridge {
    source: Arc<dyn UpdateSource>,
    sink: Arc<dyn MessageSink>,
    history: Arc<MessageHistory>,
    chat_filter: Option<i64>,
    config: TelegramConfig,
    offset: tokio::sync::Mutex<i64>,
    shutdown: Arc<Notify>,
}

impl TelegramBridge {
    /// `chat_filter` restricts intake to one chat; `None` accepts all.
    pub fn new(
        source: Arc<dyn UpdateSource>,
        sink: Arc<dyn MessageSink>,
        history: Arc<MessageHistory>,
        chat_filter: Option<i64>,
        config: TelegramConfig,
    ) -> Self {
        Self {
            source,
            sink,
            history,
            chat_filter,
            config,
            offset: tokio::sync::Mutex::new(0),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn offset(&self) -> i64 {
        *self.offset.lock().await
    }

    /// Fetch one batch, record it and hand it to the sink.
    /// Returns the number of messages the sink queued.
    pub async fn poll_once(&self, timeout_secs: u64) -> Result<usize, TelegramError> {
        let mut offset = self.offset.lock().await;
        let updates = self
            .source
            .fetch(*offset, self.config.update_limit, timeout_secs)
            .await?;
        if let Some(max) = updates.iter().map(|u| u.update_id).max() {
            *offset = (*offset).max(max + 1);
        }
        drop(offset);

        let messages: Vec<InboundMessage> = updates
            .iter()
            .filter_map(Update::to_inbound)
            .filter(|m| self.chat_filter.is_none() || m.chat_id == self.chat_filter)
            .collect();
        if messages.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.history.record(&messages) {
            tracing::warn!(error = %e, "Failed to persist message history");
        }
        tracing::debug!(count = messages.len(), "Telegram messages received");
        Ok(self.sink.accept_messages(messages).await)
    }

    /// Poll until [`shutdown`](Self::shutdown). Errors are logged and the
    /// loop continues after the regular interval.
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        tracing::info!(
            interval_secs = self.config.poll_interval_secs,
            chat = ?self.chat_filter,
            "Telegram bridge started"
        );
        loop {
            tokio::select! {
                result = self.poll_once(self.config.long_poll_timeout_secs) => {
                    match result {
                        Ok(0) => {}
                        Ok(queued) => tracing::info!(queued, "Telegram messages queued"),
                        Err(e) => tracing::warn!(error = %e, "Telegram poll failed"),
                    }
                }
                _ = self.shutdown.notified() => break,
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.notified() => break,
            }
        }
        tracing::info!("Telegram bridge stopped");
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
