//! `am-llm` — the LLM Client (§4.10): a provider-agnostic wrapper around
//! an Anthropic-compatible `/v1/messages` endpoint, fed credentials
//! through the `CredentialProvider` interface rather than owning them.

pub mod client;
pub mod credential;

pub use client::{ChatResponse, LlmClient, StopReason, Usage};
pub use credential::{CredentialProvider, StaticCredentialProvider};
