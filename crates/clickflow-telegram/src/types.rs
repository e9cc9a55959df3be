//! Bot API wire types, limited to the fields Clickflow reads.

use serde::Deserialize;
use serde_json::Value;

use clickflow_core::types::{InboundMessage, MessageKind, Timestamp, MEDIA_PLACEHOLDER};

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub document: Option<Value>,
    pub photo: Option<Vec<Value>>,
    pub sticker: Option<Value>,
    pub animation: Option<Value>,
    pub voice: Option<Value>,
    pub video: Option<Value>,
    pub contact: Option<Value>,
    pub location: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

impl Message {
    /// Kind by first present field, text taking precedence.
    pub fn kind(&self) -> MessageKind {
        if self.text.is_some() {
            MessageKind::Text
        } else if self.document.is_some() {
            MessageKind::Document
        } else if self.photo.is_some() {
            MessageKind::Photo
        } else if self.sticker.is_some() {
            MessageKind::Sticker
        } else if self.animation.is_some() {
            MessageKind::Animation
        } else if self.voice.is_some() {
            MessageKind::Voice
        } else if self.video.is_some() {
            MessageKind::Video
        } else if self.contact.is_some() {
            MessageKind::Contact
        } else if self.location.is_some() {
            MessageKind::Location
        } else {
            MessageKind::Unknown
        }
    }

    /// Text, else caption, else the media placeholder.
    pub fn content(&self) -> String {
        self.text
            .as_ref()
            .or(self.caption.as_ref())
            .cloned()
            .unwrap_or_else(|| MEDIA_PLACEHOLDER.to_string())
    }
}

impl Update {
    /// Convert to an inbound message. Updates without a message yield `None`.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let message = self.message.as_ref()?;
        let (sender, username) = match &message.from {
            Some(user) => {
                let sender = match &user.last_name {
                    Some(last) if !last.is_empty() => format!("{} {}", user.first_name, last),
                    _ => user.first_name.clone(),
                };
                let username = user
                    .username
                    .as_ref()
                    .map(|u| format!("@{u}"))
                    .unwrap_or_default();
                (sender, username)
            }
            None => (String::new(), String::new()),
        };
        Some(InboundMessage {
            id: self.update_id,
            time: Timestamp(message.date),
            sender,
            username,
            content: message.content(),
            kind: message.kind(),
            chat_id: Some(message.chat.id),
            unread: true,
        })
    }
}
