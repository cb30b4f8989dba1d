use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness/dispatch eligibility of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Online,
    Offline,
}

impl WorkerStatus {
    /// Clamp an arbitrary string onto the two known states; anything
    /// unrecognized is treated as `offline` (fail safe for dispatch).
    pub fn clamp(raw: &str) -> Self {
        match raw {
            "online" => WorkerStatus::Online,
            _ => WorkerStatus::Offline,
        }
    }
}

/// The unit of capacity: one worker process hosting agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,
    pub hostname: String,
    pub name: String,
    pub address: String,
    pub max_concurrent_agents: u32,
    pub current_agents: u32,
    pub capabilities: Vec<String>,
    pub status: WorkerStatus,
    pub last_heartbeat_at: DateTime<Utc>,
    /// SHA-256 hash of the most recently issued auth token. Never the
    /// plaintext token itself.
    #[serde(skip)]
    pub auth_token_hash: Vec<u8>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn has_capacity(&self) -> bool {
        self.status == WorkerStatus::Online && self.current_agents < self.max_concurrent_agents
    }
}

/// Public projection of a [`WorkerRecord`] (never carries the token hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerView {
    pub id: String,
    pub hostname: String,
    pub name: String,
    pub address: String,
    pub max_concurrent_agents: u32,
    pub current_agents: u32,
    pub capabilities: Vec<String>,
    pub status: WorkerStatus,
    pub last_heartbeat_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkerRecord> for WorkerView {
    fn from(w: &WorkerRecord) -> Self {
        Self {
            id: w.id.clone(),
            hostname: w.hostname.clone(),
            name: w.name.clone(),
            address: w.address.clone(),
            max_concurrent_agents: w.max_concurrent_agents,
            current_agents: w.current_agents,
            capabilities: w.capabilities.clone(),
            status: w.status,
            last_heartbeat_at: w.last_heartbeat_at,
            registered_at: w.registered_at,
            updated_at: w.updated_at,
        }
    }
}
