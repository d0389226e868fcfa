//! An abstraction layer for the language-model backend.
//!
//! This crate establishes a unified protocol for the agent to talk to
//! any supported backend, so that the orchestration loop never depends
//! on a concrete wire format. The types describe one chat-completion
//! exchange: an ordered message history plus tool declarations go in,
//! a single assistant message comes out.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
