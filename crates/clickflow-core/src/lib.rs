pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ClickflowConfig;
pub use error::{ClickflowError, Result};
pub use events::{event_channel, DomainEvent, EventSender, StopReason};
pub use types::*;
