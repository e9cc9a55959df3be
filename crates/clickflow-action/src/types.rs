//! Scenario and action records.
//!
//! These are the persisted shapes. Field names follow the camelCase JSON
//! layout the scenario file has always used, with aliases for the older
//! `actionDelay` / `loopOptions` keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use clickflow_core::types::{ActionId, MovementSpeed, ScenarioId, Timestamp};

use crate::error::ValidationError;
use crate::params::ActionParams;

/// Icon given to newly created scenarios.
pub const DEFAULT_SCENARIO_ICON: &str = "📁";

/// Inter-action delay given to newly created scenarios.
pub const DEFAULT_ACTION_DELAY_MS: u64 = 500;

// =============================================================================
// ActionKind
// =============================================================================

/// The closed set of action primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Delay,
    If,
    Loop,
    LaunchApp,
    ActivateWindow,
    MouseMove,
    MouseClick,
    TypeText,
    KeyPress,
    Hotkey,
    SetClipboard,
    ReadClipboard,
    WaitUntilClipboardChanges,
    WaitUntilPixelColor,
    ScreenshotRegion,
    SendMessageToTele,
}

impl ActionKind {
    pub const ALL: [ActionKind; 16] = [
        ActionKind::Delay,
        ActionKind::If,
        ActionKind::Loop,
        ActionKind::LaunchApp,
        ActionKind::ActivateWindow,
        ActionKind::MouseMove,
        ActionKind::MouseClick,
        ActionKind::TypeText,
        ActionKind::KeyPress,
        ActionKind::Hotkey,
        ActionKind::SetClipboard,
        ActionKind::ReadClipboard,
        ActionKind::WaitUntilClipboardChanges,
        ActionKind::WaitUntilPixelColor,
        ActionKind::ScreenshotRegion,
        ActionKind::SendMessageToTele,
    ];

    /// Wire name, as stored in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Delay => "delay",
            ActionKind::If => "if",
            ActionKind::Loop => "loop",
            ActionKind::LaunchApp => "launchApp",
            ActionKind::ActivateWindow => "activateWindow",
            ActionKind::MouseMove => "mouseMove",
            ActionKind::MouseClick => "mouseClick",
            ActionKind::TypeText => "typeText",
            ActionKind::KeyPress => "keyPress",
            ActionKind::Hotkey => "hotkey",
            ActionKind::SetClipboard => "setClipboard",
            ActionKind::ReadClipboard => "readClipboard",
            ActionKind::WaitUntilClipboardChanges => "waitUntilClipboardChanges",
            ActionKind::WaitUntilPixelColor => "waitUntilPixelColor",
            ActionKind::ScreenshotRegion => "screenshotRegion",
            ActionKind::SendMessageToTele => "sendMessageToTele",
        }
    }

    /// Name shown in the action palette.
    pub fn display_name(&self) -> &'static str {
        match self {
            ActionKind::Delay => "Delay",
            ActionKind::If => "If Condition",
            ActionKind::Loop => "Loop",
            ActionKind::LaunchApp => "Launch App",
            ActionKind::ActivateWindow => "Activate Window",
            ActionKind::MouseMove => "Mouse Move",
            ActionKind::MouseClick => "Mouse Click",
            ActionKind::TypeText => "Type Text",
            ActionKind::KeyPress => "Key Press",
            ActionKind::Hotkey => "Hotkey",
            ActionKind::SetClipboard => "Set Clipboard",
            ActionKind::ReadClipboard => "Read Clipboard",
            ActionKind::WaitUntilClipboardChanges => "Wait for Clipboard Change",
            ActionKind::WaitUntilPixelColor => "Wait for Pixel Color",
            ActionKind::ScreenshotRegion => "Screenshot",
            ActionKind::SendMessageToTele => "Send to Telegram",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

// =============================================================================
// Action
// =============================================================================

/// One step of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Action {
    /// Parse and validate the parameter map.
    pub fn params(&self) -> Result<ActionParams, ValidationError> {
        ActionParams::parse(self.kind, &self.parameters)
    }

    /// Name for progress display, falling back to the kind's display name.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            self.kind.display_name()
        } else {
            &self.name
        }
    }
}

// =============================================================================
// Scenario
// =============================================================================

/// A named, ordered list of actions plus its execution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    #[serde(default = "default_action_delay", alias = "actionDelay")]
    pub action_delay_ms: u64,
    #[serde(default)]
    pub movement_speed: MovementSpeed,
    #[serde(default, alias = "loopOptions")]
    pub loop_forever: bool,
    #[serde(default)]
    pub trigger_by_telegram: bool,
    /// Armed and waiting for its activating message. Never persisted.
    #[serde(skip)]
    pub is_waiting_for_message: bool,
    #[serde(default = "Timestamp::now")]
    pub updated_at: Timestamp,
}

fn default_icon() -> String {
    DEFAULT_SCENARIO_ICON.to_string()
}

fn default_repeat_count() -> u32 {
    1
}

fn default_action_delay() -> u64 {
    DEFAULT_ACTION_DELAY_MS
}

impl Scenario {
    pub fn new(id: ScenarioId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            icon: default_icon(),
            description: String::new(),
            actions: Vec::new(),
            repeat_count: 1,
            action_delay_ms: DEFAULT_ACTION_DELAY_MS,
            movement_speed: MovementSpeed::default(),
            loop_forever: false,
            trigger_by_telegram: false,
            is_waiting_for_message: false,
            updated_at: Timestamp::now(),
        }
    }

    /// Enabling the Telegram trigger turns loop-forever off.
    pub fn set_trigger_by_telegram(&mut self, enabled: bool) {
        self.trigger_by_telegram = enabled;
        if enabled {
            self.loop_forever = false;
        }
    }

    /// Enabling loop-forever turns the Telegram trigger off.
    pub fn set_loop_forever(&mut self, enabled: bool) {
        self.loop_forever = enabled;
        if enabled {
            self.trigger_by_telegram = false;
        }
    }

    /// Repair a record that has both exclusive flags set. The trigger wins.
    pub fn normalize(&mut self) {
        if self.trigger_by_telegram && self.loop_forever {
            self.loop_forever = false;
        }
        if self.repeat_count == 0 {
            self.repeat_count = 1;
        }
    }

    /// Number of passes a run performs. Telegram-triggered runs execute once
    /// per message.
    pub fn effective_repeat_count(&self) -> u32 {
        if self.trigger_by_telegram {
            1
        } else {
            self.repeat_count.max(1)
        }
    }

    pub fn next_action_id(&self) -> ActionId {
        ActionId(self.actions.iter().map(|a| a.id.0).max().unwrap_or(0) + 1)
    }

    pub fn action_index(&self, id: ActionId) -> Option<usize> {
        self.actions.iter().position(|a| a.id == id)
    }

    /// Validate every action's parameters, returning the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for action in &self.actions {
            action.params()?;
        }
        Ok(())
    }
}
