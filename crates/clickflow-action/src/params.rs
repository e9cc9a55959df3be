//! Typed action parameters.
//!
//! The editor stores parameters as a loose string-keyed map: numbers may
//! arrive as JSON numbers or numeric strings, and coordinate lists and
//! regions as JSON-encoded strings. [`ActionParams::parse`] turns that map
//! into one variant per action kind, applying defaults and bounds, so the
//! engine never touches raw parameters.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use clickflow_core::types::{MouseButton, Point, Region, Rgb};

use crate::error::ValidationError;
use crate::types::ActionKind;

pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_CLIPBOARD_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PIXEL_TIMEOUT_MS: u64 = 5_000;
pub const MIN_WAIT_TIMEOUT_MS: u64 = 100;
pub const MAX_CLICK_COUNT: u64 = 10;

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("Invalid color regex"))
}

/// Points visited by a mouse action, with its pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerPath {
    pub points: Vec<Point>,
    /// Pause between consecutive points. `None` uses the engine default.
    pub delay_between_ms: Option<u64>,
    /// Pause after the last point.
    pub delay_after_ms: u64,
}

/// What a Telegram send action delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramPayload {
    Text,
    /// The file whose path is on the clipboard.
    Photo,
}

/// Validated parameters, one variant per [`ActionKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionParams {
    Delay {
        duration_ms: u64,
    },
    If {
        condition: String,
    },
    Loop {
        count: Option<u64>,
        condition: Option<String>,
    },
    LaunchApp {
        executable_path: String,
        arguments: Vec<String>,
    },
    ActivateWindow {
        title_contains: Option<String>,
        process_name: Option<String>,
    },
    MouseMove {
        path: PointerPath,
    },
    MouseClick {
        path: PointerPath,
        button: MouseButton,
        click_count: u8,
    },
    /// `text: None` types the clipboard contents.
    TypeText {
        text: Option<String>,
        delay_per_char_ms: u64,
    },
    KeyPress {
        key: String,
    },
    Hotkey {
        keys: Vec<String>,
    },
    SetClipboard {
        text: String,
    },
    ReadClipboard {
        variable: String,
    },
    WaitUntilClipboardChanges {
        timeout_ms: u64,
    },
    WaitUntilPixelColor {
        point: Point,
        color: Rgb,
        timeout_ms: u64,
    },
    /// `region: None` captures the full screen.
    ScreenshotRegion {
        region: Option<Region>,
        save_path: Option<String>,
    },
    SendMessageToTele {
        payload: TelegramPayload,
        chat_id: Option<String>,
        text: Option<String>,
        caption: Option<String>,
    },
}

impl ActionParams {
    /// Parse and validate a raw parameter map for the given kind.
    pub fn parse(kind: ActionKind, map: &Map<String, Value>) -> Result<Self, ValidationError> {
        let r = ParamReader { kind, map };
        let params = match kind {
            ActionKind::Delay => ActionParams::Delay {
                duration_ms: r.number("durationMs", DEFAULT_DELAY_MS, 0, None)?,
            },
            ActionKind::If => ActionParams::If {
                condition: r.required_text("condition")?,
            },
            ActionKind::Loop => ActionParams::Loop {
                count: r.optional_number("count", 1, None)?,
                condition: r.text("condition"),
            },
            ActionKind::LaunchApp => ActionParams::LaunchApp {
                executable_path: r.required_text("executablePath")?,
                arguments: r
                    .text("arguments")
                    .map(|a| a.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            },
            ActionKind::ActivateWindow => {
                let title_contains = r.text("titleContains");
                let process_name = r.text("processName");
                if title_contains.is_none() && process_name.is_none() {
                    return Err(ValidationError::invalid(
                        r.field("titleContains"),
                        "titleContains or processName must be provided",
                    ));
                }
                ActionParams::ActivateWindow {
                    title_contains,
                    process_name,
                }
            }
            ActionKind::MouseMove => ActionParams::MouseMove {
                path: r.pointer_path()?,
            },
            ActionKind::MouseClick => {
                let path = r.pointer_path()?;
                let button = match r.text("button") {
                    Some(b) => b
                        .parse::<MouseButton>()
                        .map_err(|e| ValidationError::invalid(r.field("button"), e))?,
                    None => MouseButton::Left,
                };
                let click_count = r.number("clickCount", 1, 1, Some(MAX_CLICK_COUNT))? as u8;
                ActionParams::MouseClick {
                    path,
                    button,
                    click_count,
                }
            }
            ActionKind::TypeText => ActionParams::TypeText {
                text: r.raw_text("text"),
                delay_per_char_ms: r.number("delayPerCharMs", 0, 0, None)?,
            },
            ActionKind::KeyPress => ActionParams::KeyPress {
                key: r.required_text("key")?,
            },
            ActionKind::Hotkey => {
                let raw = r.required_text("keys")?;
                let keys: Vec<String> = raw
                    .split('+')
                    .map(|k| k.trim().to_ascii_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keys.is_empty() {
                    return Err(ValidationError::invalid(
                        r.field("keys"),
                        format!("no keys in '{}'", raw),
                    ));
                }
                ActionParams::Hotkey { keys }
            }
            ActionKind::SetClipboard => ActionParams::SetClipboard {
                text: r.raw_text("text").ok_or_else(|| ValidationError::missing(r.field("text")))?,
            },
            ActionKind::ReadClipboard => {
                let variable = r.required_text("saveToVariable")?;
                if !variable
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(ValidationError::invalid(
                        r.field("saveToVariable"),
                        "use letters, digits and underscores only",
                    ));
                }
                ActionParams::ReadClipboard { variable }
            }
            ActionKind::WaitUntilClipboardChanges => ActionParams::WaitUntilClipboardChanges {
                timeout_ms: r.number(
                    "timeoutMs",
                    DEFAULT_CLIPBOARD_TIMEOUT_MS,
                    MIN_WAIT_TIMEOUT_MS,
                    None,
                )?,
            },
            ActionKind::WaitUntilPixelColor => {
                let point = r.single_point("coordinate")?;
                let hex = r.required_text("colorHex")?;
                let color = color_pattern()
                    .is_match(&hex)
                    .then(|| Rgb::from_hex(&hex))
                    .flatten()
                    .ok_or_else(|| {
                        ValidationError::invalid(
                            r.field("colorHex"),
                            format!("'{}' is not a #RRGGBB color", hex),
                        )
                    })?;
                ActionParams::WaitUntilPixelColor {
                    point,
                    color,
                    timeout_ms: r.number(
                        "timeoutMs",
                        DEFAULT_PIXEL_TIMEOUT_MS,
                        MIN_WAIT_TIMEOUT_MS,
                        None,
                    )?,
                }
            }
            ActionKind::ScreenshotRegion => ActionParams::ScreenshotRegion {
                region: r.region("region")?,
                save_path: r.text("savePath"),
            },
            ActionKind::SendMessageToTele => {
                let payload = match r.text("messageType").as_deref() {
                    None | Some("text") => TelegramPayload::Text,
                    Some("photo") => TelegramPayload::Photo,
                    Some(other) => {
                        return Err(ValidationError::invalid(
                            r.field("messageType"),
                            format!("expected 'text' or 'photo', got '{}'", other),
                        ))
                    }
                };
                ActionParams::SendMessageToTele {
                    payload,
                    chat_id: r.text("chatId"),
                    text: r.raw_text("text"),
                    caption: r.raw_text("caption"),
                }
            }
        };
        Ok(params)
    }

    /// One-line human description for the action list.
    pub fn describe(&self) -> String {
        match self {
            ActionParams::Delay { duration_ms } => format!("Wait {} ms", duration_ms),
            ActionParams::If { condition } => format!("If {}", condition),
            ActionParams::Loop { count, .. } => match count {
                Some(n) => format!("Loop {} times", n),
                None => "Loop".to_string(),
            },
            ActionParams::LaunchApp {
                executable_path, ..
            } => format!("Launch {}", executable_path),
            ActionParams::ActivateWindow {
                title_contains,
                process_name,
            } => match (title_contains, process_name) {
                (Some(t), _) => format!("Activate window containing '{}'", t),
                (None, Some(p)) => format!("Activate window of {}", p),
                (None, None) => "Activate window".to_string(),
            },
            ActionParams::MouseMove { path } => {
                format!("Move mouse {}", describe_points(&path.points))
            }
            ActionParams::MouseClick {
                path,
                button,
                click_count,
            } => {
                let clicks = if *click_count > 1 {
                    format!(" x{}", click_count)
                } else {
                    String::new()
                };
                format!("Click {}{} {}", button, clicks, describe_points(&path.points))
            }
            ActionParams::TypeText { text, .. } => match text {
                Some(t) => format!("Type \"{}\"", preview(t)),
                None => "Type clipboard contents".to_string(),
            },
            ActionParams::KeyPress { key } => format!("Press {}", key),
            ActionParams::Hotkey { keys } => format!("Press {}", keys.join("+")),
            ActionParams::SetClipboard { text } => format!("Copy \"{}\"", preview(text)),
            ActionParams::ReadClipboard { variable } => format!("Read clipboard into {}", variable),
            ActionParams::WaitUntilClipboardChanges { timeout_ms } => {
                format!("Wait for clipboard change (up to {} ms)", timeout_ms)
            }
            ActionParams::WaitUntilPixelColor {
                point,
                color,
                timeout_ms,
            } => format!(
                "Wait for {} at {} (up to {} ms)",
                color.to_hex(),
                point,
                timeout_ms
            ),
            ActionParams::ScreenshotRegion { region, .. } => match region {
                Some(r) => format!("Screenshot {}x{} at ({}, {})", r.width, r.height, r.x, r.y),
                None => "Screenshot full screen".to_string(),
            },
            ActionParams::SendMessageToTele { payload, .. } => match payload {
                TelegramPayload::Text => "Send Telegram message".to_string(),
                TelegramPayload::Photo => "Send Telegram photo".to_string(),
            },
        }
    }
}

fn describe_points(points: &[Point]) -> String {
    match points {
        [single] => format!("at {}", single),
        many => format!("through {} points", many.len()),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 40;
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

// =============================================================================
// Reader
// =============================================================================

struct ParamReader<'a> {
    kind: ActionKind,
    map: &'a Map<String, Value>,
}

impl ParamReader<'_> {
    fn field(&self, key: &str) -> String {
        format!("{}.{}", self.kind, key)
    }

    /// Present and non-blank; numbers and booleans are stringified.
    fn raw_text(&self, key: &str) -> Option<String> {
        let s = match self.map.get(key)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!s.trim().is_empty()).then_some(s)
    }

    /// Like `raw_text`, trimmed.
    fn text(&self, key: &str) -> Option<String> {
        self.raw_text(key).map(|s| s.trim().to_string())
    }

    fn required_text(&self, key: &str) -> Result<String, ValidationError> {
        self.text(key)
            .ok_or_else(|| ValidationError::missing(self.field(key)))
    }

    fn integer(&self, key: &str) -> Result<Option<i64>, ValidationError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| ValidationError::NotANumber {
                    field: self.field(key),
                    value: n.to_string(),
                }),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => {
                s.trim()
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| ValidationError::NotANumber {
                        field: self.field(key),
                        value: s.clone(),
                    })
            }
            Some(other) => Err(ValidationError::NotANumber {
                field: self.field(key),
                value: other.to_string(),
            }),
        }
    }

    fn optional_number(
        &self,
        key: &str,
        min: u64,
        max: Option<u64>,
    ) -> Result<Option<u64>, ValidationError> {
        let Some(value) = self.integer(key)? else {
            return Ok(None);
        };
        if value < min as i64 {
            return Err(ValidationError::TooSmall {
                field: self.field(key),
                min: min as i64,
                value,
            });
        }
        if let Some(max) = max {
            if value > max as i64 {
                return Err(ValidationError::TooLarge {
                    field: self.field(key),
                    max: max as i64,
                    value,
                });
            }
        }
        Ok(Some(value as u64))
    }

    fn number(
        &self,
        key: &str,
        default: u64,
        min: u64,
        max: Option<u64>,
    ) -> Result<u64, ValidationError> {
        Ok(self.optional_number(key, min, max)?.unwrap_or(default))
    }

    /// Decode a parameter that may hold JSON directly or JSON-encoded text.
    fn json(&self, key: &str) -> Result<Option<Value>, ValidationError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => serde_json::from_str(s)
                .map(Some)
                .map_err(|e| ValidationError::invalid(self.field(key), e.to_string())),
            Some(v) => Ok(Some(v.clone())),
        }
    }

    fn point_from(&self, key: &str, value: &Value) -> Result<Point, ValidationError> {
        let axis = |name: &str| -> Result<i32, ValidationError> {
            let v = value
                .get(name)
                .ok_or_else(|| ValidationError::invalid(self.field(key), format!("point without {}", name)))?;
            let n = match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            n.map(|f| f.round() as i32).ok_or_else(|| {
                ValidationError::invalid(self.field(key), format!("{} is not a number: {}", name, v))
            })
        };
        Ok(Point::new(axis("x")?, axis("y")?))
    }

    /// Point list from `key`, falling back to the legacy `x`/`y` pair.
    fn points(&self, key: &str) -> Result<Vec<Point>, ValidationError> {
        match self.json(key)? {
            Some(Value::Array(items)) => {
                if items.is_empty() {
                    return Err(ValidationError::invalid(self.field(key), "no points"));
                }
                items.iter().map(|v| self.point_from(key, v)).collect()
            }
            Some(v @ Value::Object(_)) => Ok(vec![self.point_from(key, &v)?]),
            Some(other) => Err(ValidationError::invalid(
                self.field(key),
                format!("expected a point or list of points, got {}", other),
            )),
            None => self.legacy_point().map(|p| vec![p]),
        }
    }

    fn legacy_point(&self) -> Result<Point, ValidationError> {
        let x = self.integer("x")?;
        let y = self.integer("y")?;
        match (x, y) {
            (Some(x), Some(y)) => Ok(Point::new(x as i32, y as i32)),
            _ => Err(ValidationError::missing(self.field("coordinates"))),
        }
    }

    fn single_point(&self, key: &str) -> Result<Point, ValidationError> {
        let points = if self.map.contains_key(key) {
            self.points(key)?
        } else if self.map.contains_key("coordinates") {
            self.points("coordinates")?
        } else {
            vec![self
                .legacy_point()
                .map_err(|_| ValidationError::missing(self.field(key)))?]
        };
        Ok(points[0])
    }

    fn pointer_path(&self) -> Result<PointerPath, ValidationError> {
        Ok(PointerPath {
            points: self.points("coordinates")?,
            delay_between_ms: self.optional_number("delayBetweenCoordsMs", 0, None)?,
            delay_after_ms: self.number("delayAfterMs", 0, 0, None)?,
        })
    }

    fn region(&self, key: &str) -> Result<Option<Region>, ValidationError> {
        let Some(value) = self.json(key)? else {
            return Ok(None);
        };
        let region: Region = serde_json::from_value(value)
            .map_err(|e| ValidationError::invalid(self.field(key), e.to_string()))?;
        if region.width == 0 || region.height == 0 {
            return Err(ValidationError::invalid(
                self.field(key),
                "width and height must be positive",
            ));
        }
        Ok(Some(region))
    }
}
