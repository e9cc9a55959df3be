//! Scenario execution engine for Clickflow.
//!
//! Interprets a scenario's ordered action list against the shared execution
//! context: repeat and loop policy, Telegram trigger gating with a FIFO
//! message queue, cancellation, and progress events.

pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod queue;
pub mod state;

pub use context::{ExecutionSnapshot, RunOutcome, RunPlan, Step};
pub use dispatch::{ActionOutcome, Adapters};
pub use engine::{ScenarioEngine, StartOutcome};
pub use error::EngineError;
pub use queue::MessageQueue;
pub use state::EnginePhase;
