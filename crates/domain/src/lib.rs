//! `am-domain` — shared types for the agentmesh orchestration fabric:
//! the Worker/Universe/Agent/Conversation/Turn data model, the
//! provider-agnostic LLM message shape, the shared error type, and the
//! config primitives every binary in the workspace builds on.

pub mod config;
pub mod conversation;
pub mod error;
pub mod tool;
pub mod universe;
pub mod worker;

pub use error::{Error, Result};
