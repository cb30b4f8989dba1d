//! Liveness Reaper (§4.2): periodically pings workers that have gone
//! quiet and marks them offline if they don't answer. Heartbeats are
//! the fast path; this is the backstop for workers that die without
//! deregistering.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::ReaperConfig;
use crate::registry::WorkerRegistry;
use am_domain::worker::WorkerStatus;

pub struct LivenessReaper {
    registry: Arc<WorkerRegistry>,
    config: ReaperConfig,
    client: reqwest::Client,
}

impl LivenessReaper {
    pub fn new(registry: Arc<WorkerRegistry>, config: ReaperConfig) -> Self {
        Self {
            registry,
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Run the sweep loop until `cancel` fires. Intended to be spawned
    /// as a background task alongside the HTTP server.
    pub async fn run(&self, cancel: CancellationToken) {
        let interval = Duration::from_secs(self.config.sweep_interval_sec);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("liveness reaper shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sweep().await {
                        tracing::warn!(error = %e, "liveness sweep failed");
                    }
                }
            }
        }
    }

    async fn sweep(&self) -> am_domain::error::Result<()> {
        let workers = self.registry.list(None).await?;
        let threshold = chrono::Duration::seconds(self.config.stale_threshold_sec);
        let now = Utc::now();
        let ping_timeout = Duration::from_secs(self.config.ping_timeout_sec);

        for worker in workers {
            if worker.status != WorkerStatus::Online {
                continue;
            }
            if now - worker.last_heartbeat_at < threshold {
                continue;
            }
            if worker.address.is_empty() {
                self.registry.mark_offline(&worker.id).await?;
                tracing::warn!(worker_id = %worker.id, "stale worker has no address, marking offline");
                continue;
            }

            let url = format!("{}/health", worker.address.trim_end_matches('/'));
            let outcome = tokio::time::timeout(ping_timeout, self.client.get(&url).send()).await;
            match outcome {
                Ok(Ok(resp)) if resp.status().is_success() => {
                    self.registry.mark_alive(&worker.id).await?;
                }
                _ => {
                    tracing::warn!(worker_id = %worker.id, address = %worker.address, "worker failed liveness ping, marking offline");
                    self.registry.mark_offline(&worker.id).await?;
                }
            }
        }
        Ok(())
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
    async fn sweep_marks_unreachable_worker_offline() {
        let pool = test_pool().await;
        let registry = Arc::new(WorkerRegistry::new(pool));
        registry.ensure_schema().await.unwrap();

        let outcome = registry
            .register(None, "host".into(), None, Some("http://127.0.0.1:1".into()), 4, vec![])
            .await
            .unwrap();

        let reaper = LivenessReaper::new(
            registry.clone(),
            ReaperConfig {
                sweep_interval_sec: 30,
                stale_threshold_sec: -1,
                ping_timeout_sec: 1,
            },
        );
        reaper.sweep().await.unwrap();

        let refreshed = registry.get(&outcome.worker.id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, WorkerStatus::Offline);
    }
}
