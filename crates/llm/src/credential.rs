//! The `CredentialProvider` interface (§9 re-architecture item): the LLM
//! client depends only on this trait, not on the Backend Client
//! concretely. In production it's implemented by the worker's Backend
//! Client (fetching from the control plane's Credential Broker); in
//! tests, a fixed-value provider.

use am_domain::error::Result;

#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a fresh API key. Called when the client has none cached,
    /// or after a 401 to force a refresh.
    async fn provide(&self) -> Result<String>;
}

/// A provider that always returns the same value. Useful for unit tests
/// and for local/manual runs where the key comes from an env var.
pub struct StaticCredentialProvider(String);

impl StaticCredentialProvider {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn provide(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
