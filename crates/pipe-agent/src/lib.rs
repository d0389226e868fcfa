//! An out-of-the-box agent that assembles the built-in tools and a model
//! provider.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring agent functionality into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod service;
mod session;
pub mod tools;

pub use session::{DEFAULT_SYSTEM_PROMPT, Session, SessionBuilder};

/// Re-exports of [`pipe_agent_core`] crate.
pub mod core {
    pub use pipe_agent_core::*;
}

/// Re-exports of [`pipe_agent_sandbox`] crate.
pub mod sandbox {
    pub use pipe_agent_sandbox::*;
}
