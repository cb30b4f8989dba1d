//! Request/response DTOs for the control-plane HTTP surface (§6).

use am_domain::worker::WorkerView;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub worker_id: Option<String>,
    pub hostname: String,
    pub worker_name: Option<String>,
    pub worker_address: Option<String>,
    pub max_concurrent_agents: u32,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub worker: WorkerView,
    /// Plaintext, returned exactly once.
    pub auth_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub current_agents: u32,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeregisterResponse {
    pub message: String,
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialResponse {
    pub key_name: String,
    pub key_value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchContext {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub extra: Vec<String>,
}

impl LaunchContext {
    /// Render as prompt-appendable context strings, in a stable order.
    pub fn as_strings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(p) = &self.project {
            out.push(format!("project: {p}"));
        }
        if let Some(n) = &self.namespace {
            out.push(format!("namespace: {n}"));
        }
        out.extend(self.extra.iter().cloned());
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchRequest {
    pub prompt: String,
    pub name: Option<String>,
    pub agent_name: Option<String>,
    pub agent_role: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub context: Option<LaunchContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchResponse {
    pub universe_id: String,
    pub worker_id: String,
    pub worker_address: String,
    pub worker_name: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListWorkersQuery {
    pub status: Option<String>,
}
