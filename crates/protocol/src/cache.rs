//! The control plane's in-memory universe cache — the projection
//! maintained by the Event Fan-out and handed to dashboard subscribers
//! as the initial `snapshot` frame. Soft state: empty after a restart,
//! rehydrated only as new worker events arrive.

use std::collections::HashMap;

use am_domain::universe::{AgentStatus, UniverseStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAgent {
    pub agent_id: String,
    pub name: Option<String>,
    pub status: AgentStatus,
    pub current_turn: u32,
    pub error_message: Option<String>,
}

impl CachedAgent {
    pub fn new(agent_id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name,
            status: AgentStatus::Running,
            current_turn: 0,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedUniverse {
    pub universe_id: String,
    pub worker_id: String,
    pub status: UniverseStatus,
    pub state_version: u64,
    pub created_at: DateTime<Utc>,
    pub agents: HashMap<String, CachedAgent>,
}

impl CachedUniverse {
    pub fn new(universe_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            universe_id: universe_id.into(),
            worker_id: worker_id.into(),
            status: UniverseStatus::Active,
            state_version: 0,
            created_at: Utc::now(),
            agents: HashMap::new(),
        }
    }
}

/// Frame sent on `/ws/universes` immediately after the dashboard connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFrame {
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    pub universes: Vec<CachedUniverse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Snapshot,
}

impl SnapshotFrame {
    pub fn new(universes: Vec<CachedUniverse>) -> Self {
        Self {
            kind: SnapshotKind::Snapshot,
            universes,
        }
    }
}

/// Everything that can arrive on a dashboard's `/ws/universes` socket.
/// `Snapshot` only ever arrives once, immediately after connect;
/// `Event` frames follow verbatim from the worker event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DashboardFrame {
    Snapshot(SnapshotFrame),
    Event(crate::event::WorkerEvent),
}
