//! Event Fan-out (§4.5): the single point every worker event passes
//! through on its way in. Updates the in-memory cache, persists to the
//! Conversation Store, and relays the raw event to every connected
//! dashboard subscriber.

use std::collections::HashMap;
use std::sync::Arc;

use am_domain::error::Result;
use am_domain::universe::{AgentStatus, UniverseStatus};
use am_protocol::cache::{CachedAgent, CachedUniverse, SnapshotFrame};
use am_protocol::event::{
    AgentDoneData, AgentErrorData, AgentStartedData, EventType, IterationDetailData, TurnEndData, TurnStartData,
    WorkerEvent,
};
use am_store::ConversationStore;
use parking_lot::RwLock;
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 1024;

pub struct EventFanout {
    cache: RwLock<HashMap<String, CachedUniverse>>,
    store: Arc<ConversationStore>,
    sender: broadcast::Sender<WorkerEvent>,
}

impl EventFanout {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            cache: RwLock::new(HashMap::new()),
            store,
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.sender.subscribe()
    }

    /// Initial frame for a freshly connected dashboard client.
    pub fn snapshot(&self) -> SnapshotFrame {
        let cache = self.cache.read();
        SnapshotFrame::new(cache.values().cloned().collect())
    }

    /// The single entry point for every event arriving from a worker's
    /// event WebSocket.
    pub async fn handle(&self, event: WorkerEvent) -> Result<()> {
        self.update_cache(&event);
        self.persist(&event).await?;
        let _ = self.sender.send(event);
        Ok(())
    }

    fn update_cache(&self, event: &WorkerEvent) {
        let mut cache = self.cache.write();

        match event.event_type {
            EventType::UniverseCreated => {
                cache
                    .entry(event.universe_id.clone())
                    .or_insert_with(|| CachedUniverse::new(event.universe_id.clone(), event.worker_id.clone()));
            }
            EventType::UniverseStopped => {
                if let Some(u) = cache.get_mut(&event.universe_id) {
                    u.status = UniverseStatus::Terminated;
                }
            }
            EventType::AgentStarted => {
                let universe = cache
                    .entry(event.universe_id.clone())
                    .or_insert_with(|| CachedUniverse::new(event.universe_id.clone(), event.worker_id.clone()));
                if let Some(agent_id) = &event.agent_id {
                    universe
                        .agents
                        .entry(agent_id.clone())
                        .or_insert_with(|| CachedAgent::new(agent_id.clone(), event.agent_name.clone()));
                }
            }
            EventType::AgentDone => {
                if let (Some(universe), Some(agent_id)) = (cache.get_mut(&event.universe_id), &event.agent_id) {
                    if let Some(agent) = universe.agents.get_mut(agent_id) {
                        agent.status = AgentStatus::Completed;
                    }
                }
            }
            EventType::AgentError => {
                if let (Some(universe), Some(agent_id)) = (cache.get_mut(&event.universe_id), &event.agent_id) {
                    if let Some(agent) = universe.agents.get_mut(agent_id) {
                        agent.status = AgentStatus::Error;
                        if let Some(data) = &event.data {
                            if let Ok(parsed) = serde_json::from_value::<AgentErrorData>(data.clone()) {
                                agent.error_message = Some(parsed.error);
                            }
                        }
                    }
                }
            }
            EventType::TurnStart => {
                if let (Some(universe), Some(agent_id)) = (cache.get_mut(&event.universe_id), &event.agent_id) {
                    if let Some(agent) = universe.agents.get_mut(agent_id) {
                        if let Some(data) = &event.data {
                            if let Ok(parsed) = serde_json::from_value::<TurnStartData>(data.clone()) {
                                agent.current_turn = parsed.turn;
                            }
                        }
                    }
                }
            }
            EventType::TurnEnd => {
                if let Some(universe) = cache.get_mut(&event.universe_id) {
                    if let Some(data) = &event.data {
                        if let Ok(parsed) = serde_json::from_value::<TurnEndData>(data.clone()) {
                            universe.state_version = parsed.state_version;
                        }
                    }
                }
            }
            EventType::LlmResponse | EventType::ToolCall | EventType::ToolResult | EventType::IterationDetail => {}
        }
    }

    async fn persist(&self, event: &WorkerEvent) -> Result<()> {
        match event.event_type {
            EventType::AgentStarted => {
                let Some(agent_id) = &event.agent_id else { return Ok(()) };
                let parsed: Option<AgentStartedData> =
                    event.data.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok());
                self.store
                    .agent_started(
                        &event.universe_id,
                        agent_id,
                        event.agent_name.as_deref(),
                        parsed.as_ref().map(|p| p.role.as_str()),
                        parsed.as_ref().map(|p| p.model.as_str()),
                        Some(event.worker_id.as_str()),
                        parsed.as_ref().map(|p| p.task_prompt.as_str()),
                    )
                    .await?;
            }
            EventType::IterationDetail => {
                let Some(agent_id) = &event.agent_id else { return Ok(()) };
                let Some(data) = &event.data else { return Ok(()) };
                if let Ok(detail) = serde_json::from_value::<IterationDetailData>(data.clone()) {
                    self.store.iteration_detail(&event.universe_id, agent_id, &detail).await?;
                }
            }
            EventType::AgentDone => {
                let Some(agent_id) = &event.agent_id else { return Ok(()) };
                let _: Option<AgentDoneData> =
                    event.data.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok());
                self.store.agent_done(&event.universe_id, agent_id).await?;
            }
            EventType::AgentError => {
                let Some(agent_id) = &event.agent_id else { return Ok(()) };
                let message = event
                    .data
                    .as_ref()
                    .and_then(|d| serde_json::from_value::<AgentErrorData>(d.clone()).ok())
                    .map(|p| p.error)
                    .unwrap_or_else(|| "unknown error".to_string());
                self.store.agent_error(&event.universe_id, agent_id, &message).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_protocol::event::AgentStartedData;

    async fn test_fanout() -> EventFanout {
        let pool = am_store::connect("sqlite::memory:?cache=shared").await.unwrap();
        EventFanout::new(Arc::new(ConversationStore::new(pool)))
    }

    #[tokio::test]
    async fn universe_created_then_agent_started_populates_cache() {
        let fanout = test_fanout().await;

        fanout
            .handle(WorkerEvent::new(EventType::UniverseCreated, "w1", "u1"))
            .await
            .unwrap();
        fanout
            .handle(
                WorkerEvent::new(EventType::AgentStarted, "w1", "u1")
                    .with_agent("a1", "lead")
                    .with_data(AgentStartedData {
                        role: "lead".into(),
                        model: "claude".into(),
                        task_prompt: "do the thing".into(),
                    }),
            )
            .await
            .unwrap();

        let snapshot = fanout.snapshot();
        assert_eq!(snapshot.universes.len(), 1);
        assert_eq!(snapshot.universes[0].agents.len(), 1);
    }

    #[tokio::test]
    async fn agent_error_sets_cache_and_persists_message() {
        let fanout = test_fanout().await;
        fanout
            .handle(WorkerEvent::new(EventType::UniverseCreated, "w1", "u1"))
            .await
            .unwrap();
        fanout
            .handle(
                WorkerEvent::new(EventType::AgentStarted, "w1", "u1")
                    .with_agent("a1", "lead")
                    .with_data(AgentStartedData {
                        role: "lead".into(),
                        model: "claude".into(),
                        task_prompt: "x".into(),
                    }),
            )
            .await
            .unwrap();
        fanout
            .handle(
                WorkerEvent::new(EventType::AgentError, "w1", "u1")
                    .with_agent("a1", "lead")
                    .with_data(AgentErrorData { error: "boom".into() }),
            )
            .await
            .unwrap();

        let snapshot = fanout.snapshot();
        let agent = &snapshot.universes[0].agents["a1"];
        assert_eq!(agent.status, AgentStatus::Error);
        assert_eq!(agent.error_message.as_deref(), Some("boom"));
    }
}
