//! Core logic including the agent loop, tool execution, configurations, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod error;
mod model_client;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentEvent, AgentStage, TurnOutcome};
pub use error::{BackendError, ConversationError, TurnError};
pub use model_client::RetryPolicy;
