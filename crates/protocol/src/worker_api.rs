//! Request/response DTOs for the worker-local HTTP surface (§6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentLaunchSpec {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    pub task: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerLaunchRequest {
    pub name: String,
    #[serde(default)]
    pub dimension_id: Option<String>,
    pub agents: Vec<AgentLaunchSpec>,
    #[serde(default)]
    pub worktree_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerLaunchResponse {
    pub universe_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentLaunchResponse {
    pub agent_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfoResponse {
    pub worker_id: String,
    pub hostname: String,
    pub name: String,
    pub current_agents: u32,
    pub max_concurrent_agents: u32,
    pub capabilities: Vec<String>,
    pub universes: Vec<am_domain::universe::UniverseRecord>,
}
