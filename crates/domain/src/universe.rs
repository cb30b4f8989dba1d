use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniverseStatus {
    Initializing,
    Active,
    Suspended,
    Terminated,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Error)
    }
}

/// Shared-state bag carried by a universe, mirrored on both the worker
/// (authoritative) and the control plane (cached projection).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseState {
    pub plan: PlanState,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub knowledge: Vec<String>,
    #[serde(default)]
    pub file_manifest: FileManifest,
    #[serde(default)]
    pub context_summary: String,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub agent_notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanState {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub milestones: Vec<String>,
    #[serde(default)]
    pub current_focus: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// A universe: an isolated execution context holding agents and a shared
/// state bag. Owned exclusively by the worker that created it; the
/// control plane only ever sees a cached projection derived from events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseRecord {
    pub universe_id: String,
    pub dimension_id: Option<String>,
    pub name: String,
    pub worktree_path: Option<String>,
    pub status: UniverseStatus,
    pub state_version: u64,
    pub created_at: DateTime<Utc>,
    pub agents: HashMap<String, AgentRecord>,
}

impl UniverseRecord {
    pub fn is_done(&self) -> bool {
        !self.agents.is_empty() && self.agents.values().all(|a| a.status.is_terminal())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub name: String,
    pub role: String,
    pub model: Option<String>,
    pub status: AgentStatus,
    pub current_turn: u32,
    pub task_prompt: String,
    #[serde(default)]
    pub error_message: Option<String>,
}
