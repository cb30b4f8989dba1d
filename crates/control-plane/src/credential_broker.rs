//! Credential Broker (§4.3): hands workers short-lived-by-convention API
//! keys over an authenticated channel so secrets never live in a
//! worker's own config file.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::WorkerRegistry;

/// Where the broker resolves an allow-listed key's actual value.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get(&self, key_name: &str) -> Option<String>;
}

/// Falls back to the control plane's own process environment. Fine for
/// a single-operator deployment; a real secret manager is a drop-in
/// replacement behind the same trait.
pub struct EnvSecretSource;

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn get(&self, key_name: &str) -> Option<String> {
        std::env::var(key_name).ok()
    }
}

/// A secret source backed by a fixed map, for tests and for operators
/// who'd rather not have the control plane read its own environment.
pub struct StaticSecretSource(pub HashMap<String, String>);

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn get(&self, key_name: &str) -> Option<String> {
        self.0.get(key_name).cloned()
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("unknown or invalid worker token")]
    Unauthorized,
    #[error("worker is offline")]
    Offline,
    #[error("key '{0}' is not allow-listed")]
    NotAllowed(String),
    #[error("no value configured for key '{0}'")]
    NotFound(String),
}

pub struct CredentialBroker {
    registry: Arc<WorkerRegistry>,
    source: Arc<dyn SecretSource>,
    allowed_keys: Vec<String>,
}

impl CredentialBroker {
    pub fn new(registry: Arc<WorkerRegistry>, source: Arc<dyn SecretSource>, allowed_keys: Vec<String>) -> Self {
        Self {
            registry,
            source,
            allowed_keys,
        }
    }

    /// `bearer_token` is the worker's plaintext auth token from the
    /// `Authorization: Bearer` header.
    pub async fn fetch(&self, bearer_token: &str, key_name: &str) -> Result<String, BrokerError> {
        let hash = crate::registry::hash_token(bearer_token);
        let worker = self
            .registry
            .find_by_token_hash(&hash)
            .await
            .map_err(|_| BrokerError::Unauthorized)?
            .ok_or(BrokerError::Unauthorized)?;

        if worker.status != am_domain::worker::WorkerStatus::Online {
            return Err(BrokerError::Offline);
        }

        if !self.allowed_keys.iter().any(|k| k == key_name) {
            return Err(BrokerError::NotAllowed(key_name.to_string()));
        }

        self.source
            .get(key_name)
            .await
            .ok_or_else(|| BrokerError::NotFound(key_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::AnyPool;

    async fn test_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPool::connect("sqlite::memory:?cache=shared").await.unwrap()
    }

    #[tokio::test]
    async fn fetch_rejects_unknown_token() {
        let pool = test_pool().await;
        let registry = Arc::new(WorkerRegistry::new(pool));
        registry.ensure_schema().await.unwrap();
        let broker = CredentialBroker::new(
            registry,
            Arc::new(StaticSecretSource(HashMap::new())),
            vec!["ANTHROPIC_API_KEY".into()],
        );
        let err = broker.fetch("nope", "ANTHROPIC_API_KEY").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unauthorized));
    }

    #[tokio::test]
    async fn fetch_rejects_non_allowlisted_key() {
        let pool = test_pool().await;
        let registry = Arc::new(WorkerRegistry::new(pool));
        registry.ensure_schema().await.unwrap();
        let outcome = registry.register(None, "h".into(), None, None, 1, vec![]).await.unwrap();

        let broker = CredentialBroker::new(
            registry,
            Arc::new(StaticSecretSource(HashMap::new())),
            vec!["ANTHROPIC_API_KEY".into()],
        );
        let err = broker.fetch(&outcome.auth_token, "SOME_OTHER_KEY").await.unwrap_err();
        assert!(matches!(err, BrokerError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn fetch_rejects_offline_worker() {
        let pool = test_pool().await;
        let registry = Arc::new(WorkerRegistry::new(pool));
        registry.ensure_schema().await.unwrap();
        let outcome = registry.register(None, "h".into(), None, None, 1, vec![]).await.unwrap();
        registry.deregister(&outcome.worker.id).await.unwrap();

        let broker = CredentialBroker::new(
            registry,
            Arc::new(StaticSecretSource(HashMap::new())),
            vec!["ANTHROPIC_API_KEY".into()],
        );
        let err = broker.fetch(&outcome.auth_token, "ANTHROPIC_API_KEY").await.unwrap_err();
        assert!(matches!(err, BrokerError::Offline));
    }

    #[tokio::test]
    async fn fetch_returns_value_for_allowed_key() {
        let pool = test_pool().await;
        let registry = Arc::new(WorkerRegistry::new(pool));
        registry.ensure_schema().await.unwrap();
        let outcome = registry.register(None, "h".into(), None, None, 1, vec![]).await.unwrap();

        let mut map = HashMap::new();
        map.insert("ANTHROPIC_API_KEY".to_string(), "sk-test-123".to_string());
        let broker = CredentialBroker::new(registry, Arc::new(StaticSecretSource(map)), vec!["ANTHROPIC_API_KEY".into()]);
        let value = broker.fetch(&outcome.auth_token, "ANTHROPIC_API_KEY").await.unwrap();
        assert_eq!(value, "sk-test-123");
    }
}
