//! Telegram Bot API integration for Clickflow.
//!
//! Sends text and photos, polls `getUpdates` for inbound messages, keeps a
//! bounded message history, and feeds text messages to the scenario engine
//! so an armed scenario runs once per message.

pub mod bridge;
pub mod client;
pub mod error;
pub mod history;
pub mod notifier;
pub mod sender;
pub mod settings;
pub mod types;

pub use bridge::{MessageSink, TelegramBridge, UpdateSource};
pub use client::TelegramClient;
pub use error::TelegramError;
pub use history::MessageHistory;
pub use notifier::Notifier;
pub use sender::BotSender;
pub use settings::{test_connection, ConnectionInfo, NotificationSettings, TelegramSettings};
pub use types::{Chat, Message, Update, User};
