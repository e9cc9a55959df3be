use clickflow_action::AdapterError;
use clickflow_core::error::ClickflowError;

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telegram API error in {method}: {description}")]
    Api { method: String, description: String },
    #[error("Telegram is not configured: {0}")]
    NotConfigured(String),
    #[error("Cannot access chat {chat_id}: {description}")]
    ChatUnavailable { chat_id: String, description: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] ClickflowError),
}

impl From<TelegramError> for ClickflowError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::Storage(inner) => inner,
            TelegramError::NotConfigured(_) => ClickflowError::Config(err.to_string()),
            other => ClickflowError::Telegram(other.to_string()),
        }
    }
}

impl From<TelegramError> for AdapterError {
    fn from(err: TelegramError) -> Self {
        AdapterError::Delivery(err.to_string())
    }
}
