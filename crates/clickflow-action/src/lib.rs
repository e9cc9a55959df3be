//! Action primitives and scenarios for Clickflow.
//!
//! Defines the closed set of action kinds, parses and validates their
//! parameter maps into typed [`ActionParams`], declares the adapter
//! contracts the engine drives, and owns the persisted [`ScenarioStore`].

pub mod adapter;
pub mod error;
pub mod params;
pub mod scenario;
pub mod types;

pub use adapter::{AutomationAdapter, ClipboardAdapter, TelegramSender};
pub use error::{AdapterError, StoreError, ValidationError};
pub use params::{ActionParams, PointerPath, TelegramPayload};
pub use scenario::{ScenarioSettings, ScenarioStore};
pub use types::{Action, ActionKind, Scenario};
