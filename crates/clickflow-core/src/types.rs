use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a scenario, allocated from a persisted monotonic counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub u64);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(ScenarioId)
            .map_err(|_| format!("invalid scenario id: {s}"))
    }
}

/// Identifier of an action, unique within its owning scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in seconds since epoch.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// A screen coordinate in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when both axes differ by at most `threshold` pixels.
    pub fn is_near(&self, other: &Point, threshold: u32) -> bool {
        self.x.abs_diff(other.x) <= threshold && self.y.abs_diff(other.y) <= threshold
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A rectangular screen region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// An RGB color sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (case-insensitive). Returns `None` for anything else.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

// =============================================================================
// Input enums
// =============================================================================

/// Mouse button used by click actions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(format!("unknown mouse button: {other}")),
        }
    }
}

/// Pointer movement profile forwarded to the automation adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSpeed {
    Fast,
    #[default]
    Normal,
    Slow,
    /// Curved, jittered motion that imitates a human hand.
    Human,
}

impl fmt::Display for MovementSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MovementSpeed::Fast => "fast",
            MovementSpeed::Normal => "normal",
            MovementSpeed::Slow => "slow",
            MovementSpeed::Human => "human",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MovementSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(MovementSpeed::Fast),
            "normal" => Ok(MovementSpeed::Normal),
            "slow" => Ok(MovementSpeed::Slow),
            "human" => Ok(MovementSpeed::Human),
            other => Err(format!("unknown movement speed: {other}")),
        }
    }
}

// =============================================================================
// Inbound messages
// =============================================================================

/// Placeholder content for messages that carry neither text nor caption.
pub const MEDIA_PLACEHOLDER: &str = "[Media Message]";

/// Payload type of an inbound chat message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Photo,
    Document,
    Sticker,
    Animation,
    Voice,
    Video,
    Contact,
    Location,
    #[default]
    Unknown,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Text => "text",
            MessageKind::Photo => "photo",
            MessageKind::Document => "document",
            MessageKind::Sticker => "sticker",
            MessageKind::Animation => "animation",
            MessageKind::Voice => "voice",
            MessageKind::Video => "video",
            MessageKind::Contact => "contact",
            MessageKind::Location => "location",
            MessageKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A chat message received from the bot's update feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Update id, strictly increasing per bot.
    pub id: i64,
    pub time: Timestamp,
    pub sender: String,
    /// `@username`, or empty when the sender has none.
    #[serde(default)]
    pub username: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default = "default_unread")]
    pub unread: bool,
}

fn default_unread() -> bool {
    true
}

impl InboundMessage {
    /// True when the content came from text or a caption rather than the
    /// media placeholder.
    pub fn has_text_content(&self) -> bool {
        !self.content.trim().is_empty() && self.content != MEDIA_PLACEHOLDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_id_parse_and_display() {
        let id: ScenarioId = " 42 ".parse().unwrap();
        assert_eq!(id, ScenarioId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_scenario_id_serializes_as_number() {
        let json = serde_json::to_string(&ScenarioId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_point_is_near() {
        let a = Point::new(100, 100);
        assert!(a.is_near(&Point::new(110, 90), 10));
        assert!(!a.is_near(&Point::new(111, 100), 10));
        assert!(!a.is_near(&Point::new(100, 89), 10));
    }

    #[test]
    fn test_rgb_hex() {
        assert_eq!(Rgb::from_hex("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::new(255, 128, 0).to_hex(), "#FF8000");
        assert_eq!(Rgb::from_hex("ff8000"), None);
        assert_eq!(Rgb::from_hex("#ff80"), None);
        assert_eq!(Rgb::from_hex("#gg8000"), None);
    }

    #[test]
    fn test_mouse_button_from_str() {
        assert_eq!("Right".parse::<MouseButton>().unwrap(), MouseButton::Right);
        assert!("thumb".parse::<MouseButton>().is_err());
        assert_eq!(MouseButton::default(), MouseButton::Left);
    }

    #[test]
    fn test_movement_speed_roundtrip_display() {
        for speed in [
            MovementSpeed::Fast,
            MovementSpeed::Normal,
            MovementSpeed::Slow,
            MovementSpeed::Human,
        ] {
            assert_eq!(speed.to_string().parse::<MovementSpeed>().unwrap(), speed);
        }
    }

    #[test]
    fn test_inbound_message_text_content() {
        let mut msg = InboundMessage {
            id: 1,
            time: Timestamp(0),
            sender: "Ann".into(),
            username: String::new(),
            content: "go".into(),
            kind: MessageKind::Text,
            chat_id: Some(5),
            unread: true,
        };
        assert!(msg.has_text_content());
        msg.content = MEDIA_PLACEHOLDER.into();
        assert!(!msg.has_text_content());
    }

    #[test]
    fn test_inbound_message_wire_names() {
        let json = r#"{"id":3,"time":1700000000,"sender":"Bo","content":"hi","type":"photo"}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Photo);
        assert!(msg.unread);
        assert_eq!(msg.chat_id, None);
    }

    #[test]
    fn test_timestamp_to_datetime_roundtrip() {
        let now = Utc::now();
        let ts = Timestamp::from_datetime(now);
        assert_eq!(ts.to_datetime().timestamp(), now.timestamp());
    }
}
