//! Backend Client (§4.7): the worker's three concurrent responsibilities
//! toward the control plane — register (with backoff and re-register on
//! a 404 heartbeat), heartbeat, and a persistent event WebSocket fed by
//! an [`EventQueue`].

use std::sync::Arc;
use std::time::Duration;

use am_domain::error::{Error, Result};
use am_protocol::control_api::{CredentialResponse, HeartbeatRequest, RegisterRequest, RegisterResponse};
use am_protocol::WorkerEvent;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::event_queue::EventQueue;
use crate::reconnect::ReconnectBackoff;

const EVENT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    pub control_plane_url: String,
    pub hostname: String,
    pub worker_name: Option<String>,
    pub worker_address: Option<String>,
    pub max_concurrent_agents: u32,
    pub capabilities: Vec<String>,
    pub heartbeat_interval: Duration,
}

pub struct BackendClient {
    config: BackendClientConfig,
    http: reqwest::Client,
    worker_id: String,
    auth_token: RwLock<Option<String>>,
}

impl BackendClient {
    pub fn new(config: BackendClientConfig, worker_id: String) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            worker_id,
            auth_token: RwLock::new(None),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Register once. On success, caches the fresh auth token.
    pub async fn register(&self) -> Result<RegisterResponse> {
        let url = format!("{}/api/workers/register", self.config.control_plane_url);
        let body = RegisterRequest {
            worker_id: Some(self.worker_id.clone()),
            hostname: self.config.hostname.clone(),
            worker_name: self.config.worker_name.clone(),
            worker_address: self.config.worker_address.clone(),
            max_concurrent_agents: self.config.max_concurrent_agents,
            capabilities: self.config.capabilities.clone(),
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Http(format!("register failed: HTTP {}", resp.status().as_u16())));
        }

        let parsed: RegisterResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        *self.auth_token.write().await = Some(parsed.auth_token.clone());
        Ok(parsed)
    }

    /// Retry registration with exponential backoff (1s -> 60s cap, no
    /// total-time limit) until it succeeds or shutdown fires.
    pub async fn register_with_backoff(&self, shutdown: &CancellationToken) -> Result<RegisterResponse> {
        let backoff = ReconnectBackoff::default();
        let mut attempt = 0u32;
        loop {
            match self.register().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "worker registration failed, retrying");
                }
            }

            let delay = backoff.delay_for_attempt(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(Error::Other("shutdown during registration".into())),
            }
            attempt += 1;
        }
    }

    async fn bearer_token(&self) -> Option<String> {
        self.auth_token.read().await.clone()
    }

    /// Send one heartbeat. On a 404 (worker unknown to the control
    /// plane), re-registers and returns the error so the caller can log
    /// and retry on its normal schedule next cycle.
    pub async fn heartbeat(&self, current_agents: u32, status: &str) -> Result<()> {
        let url = format!("{}/api/workers/{}/heartbeat", self.config.control_plane_url, self.worker_id);
        let token = self.bearer_token().await;
        let mut req = self.http.post(&url).json(&HeartbeatRequest {
            current_agents,
            status: status.to_string(),
        });
        if let Some(t) = &token {
            req = req.bearer_auth(t);
        }

        let resp = req.send().await.map_err(|e| Error::Http(e.to_string()))?;

        if resp.status().as_u16() == 404 {
            tracing::warn!(worker_id = %self.worker_id, "heartbeat got 404, re-registering");
            self.register().await?;
            return Err(Error::NotFound("worker unknown to control plane; re-registered".into()));
        }
        if !resp.status().is_success() {
            return Err(Error::Http(format!("heartbeat failed: HTTP {}", resp.status().as_u16())));
        }
        Ok(())
    }

    /// Run the heartbeat loop: every `heartbeat_interval`, POST current
    /// load, racing the interval sleep against shutdown so the loop
    /// exits immediately when asked.
    pub async fn run_heartbeat_loop(&self, current_agents: impl Fn() -> u32, shutdown: CancellationToken) {
        let mut consecutive_failures = 0u32;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!(worker_id = %self.worker_id, "heartbeat loop exiting on shutdown");
                    return;
                }
            }

            match self.heartbeat(current_agents(), "online").await {
                Ok(()) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(worker_id = %self.worker_id, consecutive_failures, error = %e, "heartbeat failed");
                }
            }
        }
    }

    /// Fetch a credential from the control plane's broker.
    pub async fn fetch_credential(&self, key_name: &str) -> Result<String> {
        let url = format!("{}/api/workers/credentials/{key_name}", self.config.control_plane_url);
        let token = self.bearer_token().await.ok_or_else(|| Error::Auth("no auth token yet".into()))?;

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        match resp.status().as_u16() {
            200 => {
                let parsed: CredentialResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
                Ok(parsed.key_value)
            }
            401 => Err(Error::Auth("credential request rejected (bad token)".into())),
            403 => Err(Error::Auth("worker is offline".into())),
            400 => Err(Error::Config(format!("'{key_name}' is not in the credential allow-list"))),
            404 => Err(Error::NotFound(format!("credential '{key_name}' not configured"))),
            other => Err(Error::Http(format!("credential request failed: HTTP {other}"))),
        }
    }

    fn event_ws_url(&self) -> String {
        let base = self
            .config
            .control_plane_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{base}/ws/worker/{}", self.worker_id)
    }

    /// Drain `queue` over a persistent WebSocket. On send failure, the
    /// event is pushed back to the front of the queue and the socket is
    /// reconnected after a fixed 5s backoff.
    pub async fn run_event_loop(self: Arc<Self>, queue: Arc<EventQueue>, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let url = self.event_ws_url();
            let connected = tokio::select! {
                r = tokio_tungstenite::connect_async(&url) => r,
                _ = shutdown.cancelled() => return,
            };

            let ws = match connected {
                Ok((ws, _)) => ws,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "event websocket connect failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(EVENT_RECONNECT_DELAY) => continue,
                        _ = shutdown.cancelled() => return,
                    }
                }
            };

            let (mut sink, mut stream) = ws.split();
            tracing::info!(worker_id = %self.worker_id, "event websocket connected");

            loop {
                let event = tokio::select! {
                    e = queue.pop() => e,
                    _ = shutdown.cancelled() => {
                        let _ = sink.close().await;
                        return;
                    }
                };

                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize worker event, dropping");
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(json)).await {
                    tracing::warn!(error = %e, "event send failed, re-queueing and reconnecting");
                    queue.push_front(event).await;
                    break;
                }

                // Non-blocking check for a server-initiated close; the
                // control plane otherwise never sends this worker anything.
                if let Some(Ok(Message::Close(_))) = stream.next().now_or_never().flatten() {
                    tracing::info!(worker_id = %self.worker_id, "control plane closed event socket");
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(EVENT_RECONNECT_DELAY) => {}
                _ = shutdown.cancelled() => return,
            }
        }
    }
}

/// The worker obtains its LLM credential through the Backend Client's
/// broker round-trip; this is the production `CredentialProvider`.
pub struct BackendCredentialProvider {
    client: Arc<BackendClient>,
    key_name: String,
}

impl BackendCredentialProvider {
    pub fn new(client: Arc<BackendClient>, key_name: impl Into<String>) -> Self {
        Self {
            client,
            key_name: key_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl am_llm::CredentialProvider for BackendCredentialProvider {
    async fn provide(&self) -> Result<String> {
        self.client.fetch_credential(&self.key_name).await
    }
}
