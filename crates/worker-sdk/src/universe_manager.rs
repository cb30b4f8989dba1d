//! Universe Manager (§4.8): owns every universe running on this worker,
//! launches agents as concurrent tasks, and reaps a universe once all
//! its agents reach a terminal state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use am_domain::error::Error;
use am_domain::universe::{AgentRecord, AgentStatus, UniverseRecord, UniverseState, UniverseStatus};
use am_llm::LlmClient;
use am_protocol::event::{EventType, WorkerEvent};
use am_tools::executor::ToolExecutor;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent_loop::{AgentLoop, AgentLoopConfig, AgentOutcome};
use crate::event_queue::EventQueue;

struct RunningAgent {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ManagedUniverse {
    record: UniverseRecord,
    state: Arc<RwLock<UniverseState>>,
    /// The one counter every agent task in this universe shares and
    /// increments via `turn_end` — `record.state_version` is only a
    /// point-in-time snapshot of this value, refreshed on read.
    state_version: Arc<AtomicU64>,
    agents: HashMap<String, RunningAgent>,
}

/// Everything `launch_universe`/`launch_agent` need to spin up an agent
/// task: the worker's identity plus the shared LLM client and tool
/// executor (one of each per worker process).
pub struct UniverseManager {
    worker_id: String,
    llm: Arc<LlmClient>,
    tools: Arc<ToolExecutor>,
    events: Arc<EventQueue>,
    universes: Arc<RwLock<HashMap<String, ManagedUniverse>>>,
    max_turns: u32,
    max_iterations: u32,
}

pub struct AgentConfig {
    pub name: String,
    pub role: String,
    pub model: Option<String>,
    pub task_prompt: String,
}

impl UniverseManager {
    pub fn new(worker_id: String, llm: Arc<LlmClient>, tools: Arc<ToolExecutor>, events: Arc<EventQueue>) -> Self {
        Self::with_loop_bounds(
            worker_id,
            llm,
            tools,
            events,
            crate::agent_loop::DEFAULT_MAX_TURNS,
            crate::agent_loop::DEFAULT_MAX_ITERATIONS,
        )
    }

    /// Same as `new`, but with the outer/inner loop bounds a worker's
    /// own configuration picked (§6) rather than the built-in defaults.
    pub fn with_loop_bounds(
        worker_id: String,
        llm: Arc<LlmClient>,
        tools: Arc<ToolExecutor>,
        events: Arc<EventQueue>,
        max_turns: u32,
        max_iterations: u32,
    ) -> Self {
        Self {
            worker_id,
            llm,
            tools,
            events,
            universes: Arc::new(RwLock::new(HashMap::new())),
            max_turns,
            max_iterations,
        }
    }

    /// Count of agents not yet in a terminal state, across all
    /// universes — must match what the heartbeat loop reports.
    pub fn running_agent_count(&self) -> u32 {
        self.universes
            .read()
            .values()
            .flat_map(|u| u.record.agents.values())
            .filter(|a| !a.status.is_terminal())
            .count() as u32
    }

    pub async fn launch_universe(
        &self,
        name: String,
        dimension_id: Option<String>,
        agents_config: Vec<AgentConfig>,
        worktree_path: Option<String>,
    ) -> String {
        let universe_id = Uuid::new_v4().to_string();
        let record = UniverseRecord {
            universe_id: universe_id.clone(),
            dimension_id,
            name,
            worktree_path: worktree_path.clone(),
            status: UniverseStatus::Active,
            state_version: 0,
            created_at: chrono::Utc::now(),
            agents: HashMap::new(),
        };

        self.universes.write().insert(
            universe_id.clone(),
            ManagedUniverse {
                record,
                state: Arc::new(RwLock::new(UniverseState::default())),
                state_version: Arc::new(AtomicU64::new(0)),
                agents: HashMap::new(),
            },
        );

        self.publish(EventType::UniverseCreated, &universe_id, None).await;

        for agent in agents_config {
            self.launch_agent(&universe_id, agent.name, agent.role, agent.model, agent.task_prompt, worktree_path.clone())
                .await;
        }

        universe_id
    }

    pub async fn launch_agent(
        &self,
        universe_id: &str,
        name: String,
        role: String,
        model: Option<String>,
        task_prompt: String,
        worktree_path: Option<String>,
    ) -> Option<String> {
        let agent_id = Uuid::new_v4().to_string();

        let (state, state_version) = {
            let mut universes = self.universes.write();
            let Some(universe) = universes.get_mut(universe_id) else {
                tracing::warn!(universe_id, "launch_agent: unknown universe");
                return None;
            };
            universe.record.agents.insert(
                agent_id.clone(),
                AgentRecord {
                    agent_id: agent_id.clone(),
                    name: name.clone(),
                    role: role.clone(),
                    model: model.clone(),
                    status: AgentStatus::Idle,
                    current_turn: 0,
                    task_prompt: task_prompt.clone(),
                    error_message: None,
                },
            );
            (universe.state.clone(), universe.state_version.clone())
        };

        let mut config = AgentLoopConfig::with_defaults(
            universe_id.to_string(),
            self.worker_id.clone(),
            agent_id.clone(),
            name,
            role,
            model,
            task_prompt,
            worktree_path.map(PathBuf::from),
        );
        config.max_turns = self.max_turns;
        config.max_iterations = self.max_iterations;

        let agent_loop = AgentLoop::new(config, self.llm.clone(), self.tools.clone(), self.events.clone(), state, state_version);
        let cancel = CancellationToken::new();
        let universes = self.universes.clone();
        let universe_id_owned = universe_id.to_string();
        let agent_id_for_task = agent_id.clone();
        let worker_id = self.worker_id.clone();
        let events = self.events.clone();

        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = agent_loop.run(task_cancel).await;
            let status = match outcome {
                AgentOutcome::Completed => AgentStatus::Completed,
                AgentOutcome::Paused => AgentStatus::Paused,
                AgentOutcome::Error => AgentStatus::Error,
            };

            let universe_done = {
                let mut universes = universes.write();
                if let Some(universe) = universes.get_mut(&universe_id_owned) {
                    if let Some(record) = universe.record.agents.get_mut(&agent_id_for_task) {
                        record.status = status;
                    }
                    universe.record.is_done()
                } else {
                    false
                }
            };

            if universe_done {
                let event = WorkerEvent::new(EventType::UniverseStopped, worker_id, universe_id_owned.clone());
                events.push(event).await;
                let mut universes = universes.write();
                if let Some(universe) = universes.get_mut(&universe_id_owned) {
                    universe.record.status = UniverseStatus::Terminated;
                }
            }
        });

        {
            let mut universes = self.universes.write();
            if let Some(universe) = universes.get_mut(universe_id) {
                universe.agents.insert(agent_id.clone(), RunningAgent { cancel, handle });
            }
        }

        Some(agent_id)
    }

    pub fn stop_agent(&self, universe_id: &str, agent_id: &str) {
        let mut universes = self.universes.write();
        if let Some(universe) = universes.get_mut(universe_id) {
            if let Some(running) = universe.agents.get(agent_id) {
                running.cancel.cancel();
            }
            if let Some(record) = universe.record.agents.get_mut(agent_id) {
                record.status = AgentStatus::Paused;
            }
        }
    }

    pub async fn stop_universe(&self, universe_id: &str) {
        {
            let mut universes = self.universes.write();
            let Some(universe) = universes.get_mut(universe_id) else {
                return;
            };
            for running in universe.agents.values() {
                running.cancel.cancel();
            }
            universe.record.status = UniverseStatus::Terminated;
        }
        self.publish(EventType::UniverseStopped, universe_id, None).await;
    }

    pub async fn stop_all(&self) {
        let universe_ids: Vec<String> = self.universes.read().keys().cloned().collect();
        for id in universe_ids {
            self.stop_universe(&id).await;
        }
    }

    pub fn get_universe(&self, universe_id: &str) -> Option<UniverseRecord> {
        self.universes.read().get(universe_id).map(snapshot_record)
    }

    pub fn list_universes(&self) -> Vec<UniverseRecord> {
        self.universes.read().values().map(snapshot_record).collect()
    }

    async fn publish(&self, event_type: EventType, universe_id: &str, agent_id: Option<&str>) {
        let mut event = WorkerEvent::new(event_type, self.worker_id.clone(), universe_id.to_string());
        if let Some(id) = agent_id {
            event = event.with_agent(id.to_string(), String::new());
        }
        self.events.push(event).await;
    }
}

/// `record.state_version` is only ever written at universe-creation
/// time; the live value lives in the shared atomic each agent task
/// bumps on `turn_end`, so every external read refreshes it here.
fn snapshot_record(universe: &ManagedUniverse) -> UniverseRecord {
    let mut record = universe.record.clone();
    record.state_version = universe.state_version.load(Ordering::SeqCst);
    record
}

/// Convenience error used by the worker-local HTTP surface when a
/// request references a universe this manager has never heard of.
pub fn unknown_universe(universe_id: &str) -> Error {
    Error::NotFound(format!("universe '{universe_id}' not found"))
}
