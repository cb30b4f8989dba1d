//! Worker Registry (§4.1): the persistent catalog of workers, keyed by
//! stable worker id. Re-registration always issues a fresh auth token
//! and resets load to zero — the worker restarted.

use am_domain::error::{Error, Result};
use am_domain::worker::{WorkerRecord, WorkerStatus};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[derive(Clone)]
pub struct WorkerRegistry {
    pool: AnyPool,
}

/// The result of `register`: the worker row plus the one-time plaintext
/// auth token (never stored, only its hash).
pub struct RegisterOutcome {
    pub worker: WorkerRecord,
    pub auth_token: String,
}

impl WorkerRegistry {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workers (
                id TEXT PRIMARY KEY,
                hostname TEXT NOT NULL,
                name TEXT NOT NULL,
                address TEXT NOT NULL,
                max_concurrent_agents INTEGER NOT NULL,
                current_agents INTEGER NOT NULL DEFAULT 0,
                capabilities TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'online',
                last_heartbeat_at TEXT NOT NULL,
                auth_token_hash TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Register or re-register (upsert by `worker_id`). Always mints a
    /// fresh auth token and resets `current_agents` to zero.
    pub async fn register(
        &self,
        worker_id: Option<String>,
        hostname: String,
        name: Option<String>,
        address: Option<String>,
        max_concurrent_agents: u32,
        capabilities: Vec<String>,
    ) -> Result<RegisterOutcome> {
        let id = worker_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = name.unwrap_or_else(|| hostname.clone());
        let address = address.unwrap_or_default();
        let capabilities_json = serde_json::to_string(&capabilities)?;
        let auth_token = generate_token();
        let token_hash = hash_token(&auth_token);
        let now = Utc::now();

        let existing = self.get(&id).await?;
        if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE workers
                SET hostname = ?, name = ?, address = ?, max_concurrent_agents = ?,
                    current_agents = 0, capabilities = ?, status = 'online',
                    last_heartbeat_at = ?, auth_token_hash = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&hostname)
            .bind(&name)
            .bind(&address)
            .bind(max_concurrent_agents as i64)
            .bind(&capabilities_json)
            .bind(now.to_rfc3339())
            .bind(&token_hash)
            .bind(now.to_rfc3339())
            .bind(&id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            tracing::info!(worker_id = %id, hostname = %hostname, "worker re-registered, auth token rotated");
        } else {
            sqlx::query(
                r#"
                INSERT INTO workers
                    (id, hostname, name, address, max_concurrent_agents, current_agents,
                     capabilities, status, last_heartbeat_at, auth_token_hash, registered_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 0, ?, 'online', ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&hostname)
            .bind(&name)
            .bind(&address)
            .bind(max_concurrent_agents as i64)
            .bind(&capabilities_json)
            .bind(now.to_rfc3339())
            .bind(&token_hash)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            tracing::info!(worker_id = %id, hostname = %hostname, "worker registered");
        }

        let worker = self
            .get(&id)
            .await?
            .ok_or_else(|| Error::Other("worker vanished immediately after upsert".into()))?;
        Ok(RegisterOutcome { worker, auth_token })
    }

    /// Rejects with `Error::NotFound` if the id is unknown, per §4.1.
    pub async fn heartbeat(&self, worker_id: &str, current_agents: u32, status: &str) -> Result<WorkerRecord> {
        let clamped = WorkerStatus::clamp(status);
        let status_str = match clamped {
            WorkerStatus::Online => "online",
            WorkerStatus::Offline => "offline",
        };
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE workers SET current_agents = ?, status = ?, last_heartbeat_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(current_agents as i64)
        .bind(status_str)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("worker '{worker_id}' not found")));
        }

        self.get(worker_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("worker '{worker_id}' not found")))
    }

    /// Best-effort; no error if already offline or unknown.
    pub async fn deregister(&self, worker_id: &str) -> Result<()> {
        sqlx::query("UPDATE workers SET status = 'offline', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn mark_alive(&self, worker_id: &str) -> Result<()> {
        sqlx::query("UPDATE workers SET last_heartbeat_at = ?, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn mark_offline(&self, worker_id: &str) -> Result<()> {
        sqlx::query("UPDATE workers SET status = 'offline', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn list(&self, status_filter: Option<&str>) -> Result<Vec<WorkerRecord>> {
        let rows = match status_filter {
            Some(s) => sqlx::query("SELECT * FROM workers WHERE status = ? ORDER BY registered_at ASC")
                .bind(s)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?,
            None => sqlx::query("SELECT * FROM workers ORDER BY registered_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?,
        };
        rows.iter().map(row_to_worker).collect()
    }

    pub async fn get(&self, worker_id: &str) -> Result<Option<WorkerRecord>> {
        let row = sqlx::query("SELECT * FROM workers WHERE id = ?")
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_worker).transpose()
    }

    /// Looks up a worker by auth token hash without leaning on SQL
    /// equality: the candidate set is the whole table, and each row is
    /// compared against the target hash with `subtle::ConstantTimeEq`
    /// so lookup timing doesn't leak how many leading bytes matched.
    pub async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<WorkerRecord>> {
        let target = hex::decode(token_hash).map_err(|e| Error::Other(format!("bad token hash: {e}")))?;
        for worker in self.list(None).await? {
            if bool::from(worker.auth_token_hash.as_slice().ct_eq(&target)) {
                return Ok(Some(worker));
            }
        }
        Ok(None)
    }

    /// Dispatcher helper (§4.4): one online worker with free capacity,
    /// preferring the lowest `current_agents`, ties broken by oldest
    /// registration for deterministic test reproducibility.
    pub async fn select_for_dispatch(&self) -> Result<Option<WorkerRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM workers
            WHERE status = 'online' AND current_agents < max_concurrent_agents
            ORDER BY current_agents ASC, registered_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_worker).transpose()
    }
}

/// Hash a plaintext bearer token the same way for registration and
/// credential-broker lookup.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Mint a fresh auth token. Two concatenated v4 UUIDs give 244 bits of
/// randomness without pulling in a dedicated CSPRNG crate.
fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Other(format!("registry: {e}"))
}

fn row_to_worker(row: &AnyRow) -> Result<WorkerRecord> {
    let last_heartbeat: String = row.try_get("last_heartbeat_at").map_err(db_err)?;
    let registered: String = row.try_get("registered_at").map_err(db_err)?;
    let updated: String = row.try_get("updated_at").map_err(db_err)?;
    let capabilities_raw: String = row.try_get("capabilities").map_err(db_err)?;
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let token_hash_hex: String = row.try_get("auth_token_hash").map_err(db_err)?;

    Ok(WorkerRecord {
        id: row.try_get("id").map_err(db_err)?,
        hostname: row.try_get("hostname").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        address: row.try_get("address").map_err(db_err)?,
        max_concurrent_agents: row.try_get::<i64, _>("max_concurrent_agents").map_err(db_err)? as u32,
        current_agents: row.try_get::<i64, _>("current_agents").map_err(db_err)? as u32,
        capabilities: serde_json::from_str(&capabilities_raw).unwrap_or_default(),
        status: WorkerStatus::clamp(&status_raw),
        last_heartbeat_at: parse_ts(&last_heartbeat)?,
        auth_token_hash: hex::decode(&token_hash_hex).unwrap_or_default(),
        registered_at: parse_ts(&registered)?,
        updated_at: parse_ts(&updated)?,
    })
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("corrupt timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPool::connect("sqlite::memory:?cache=shared").await.unwrap()
    }

    #[tokio::test]
    async fn register_then_get() {
        let pool = test_pool().await;
        let registry = WorkerRegistry::new(pool);
        registry.ensure_schema().await.unwrap();

        let outcome = registry
            .register(None, "host1".into(), Some("w1".into()), Some("http://localhost:8100".into()), 4, vec!["git".into()])
            .await
            .unwrap();
        assert_eq!(outcome.worker.current_agents, 0);
        assert_eq!(outcome.worker.max_concurrent_agents, 4);

        let fetched = registry.get(&outcome.worker.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "w1");
    }

    #[tokio::test]
    async fn reregister_rotates_token_and_resets_load() {
        let pool = test_pool().await;
        let registry = WorkerRegistry::new(pool);
        registry.ensure_schema().await.unwrap();

        let first = registry
            .register(None, "host1".into(), None, None, 4, vec![])
            .await
            .unwrap();
        registry.heartbeat(&first.worker.id, 3, "online").await.unwrap();

        let second = registry
            .register(Some(first.worker.id.clone()), "host1".into(), None, None, 4, vec![])
            .await
            .unwrap();

        assert_ne!(first.auth_token, second.auth_token);
        assert_eq!(second.worker.current_agents, 0);

        let old_hash = hash_token(&first.auth_token);
        assert!(registry.find_by_token_hash(&old_hash).await.unwrap().is_none());
        let new_hash = hash_token(&second.auth_token);
        assert!(registry.find_by_token_hash(&new_hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn heartbeat_unknown_worker_errors() {
        let pool = test_pool().await;
        let registry = WorkerRegistry::new(pool);
        registry.ensure_schema().await.unwrap();
        let err = registry.heartbeat("ghost", 0, "online").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn select_for_dispatch_prefers_lowest_load() {
        let pool = test_pool().await;
        let registry = WorkerRegistry::new(pool);
        registry.ensure_schema().await.unwrap();

        let a = registry.register(None, "a".into(), None, None, 4, vec![]).await.unwrap();
        let b = registry.register(None, "b".into(), None, None, 4, vec![]).await.unwrap();
        registry.heartbeat(&a.worker.id, 3, "online").await.unwrap();
        registry.heartbeat(&b.worker.id, 1, "online").await.unwrap();

        let selected = registry.select_for_dispatch().await.unwrap().unwrap();
        assert_eq!(selected.id, b.worker.id);
    }

    #[tokio::test]
    async fn select_for_dispatch_ignores_offline_and_full() {
        let pool = test_pool().await;
        let registry = WorkerRegistry::new(pool);
        registry.ensure_schema().await.unwrap();

        let full = registry.register(None, "full".into(), None, None, 1, vec![]).await.unwrap();
        registry.heartbeat(&full.worker.id, 1, "online").await.unwrap();
        let offline = registry.register(None, "off".into(), None, None, 4, vec![]).await.unwrap();
        registry.deregister(&offline.worker.id).await.unwrap();

        assert!(registry.select_for_dispatch().await.unwrap().is_none());
    }
}
