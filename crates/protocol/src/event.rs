//! The worker → control-plane event envelope and the typed payloads that
//! ride in its `data` field.
//!
//! The wire format is exactly the one table in the core spec: `{type,
//! worker_id, universe_id, agent_id?, agent_name?, data?, timestamp}`.
//! `EventType` is a closed enum rather than a bare string — an invalid
//! kind is unrepresentable, per the tagged-variant re-architecture note.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UniverseCreated,
    UniverseStopped,
    AgentStarted,
    AgentDone,
    AgentError,
    TurnStart,
    TurnEnd,
    LlmResponse,
    ToolCall,
    ToolResult,
    IterationDetail,
}

/// One frame on `/ws/worker/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub worker_id: String,
    pub universe_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl WorkerEvent {
    pub fn new(event_type: EventType, worker_id: impl Into<String>, universe_id: impl Into<String>) -> Self {
        Self {
            event_type,
            worker_id: worker_id.into(),
            universe_id: universe_id.into(),
            agent_id: None,
            agent_name: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

// ── Typed payloads for `data` ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStartedData {
    pub role: String,
    pub model: String,
    pub task_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnStartData {
    pub turn: u32,
    pub max_turns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEndData {
    pub state_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentErrorData {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDoneData {
    pub total_turns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponseUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponseData {
    /// First 500 chars of assistant text, per the inner-loop spec.
    pub text_preview: String,
    pub usage: LlmResponseUsage,
    pub stop_reason: String,
    pub iteration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallData {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultData {
    pub call_id: String,
    pub tool_name: String,
    /// Truncated to 1000 chars, matching the iteration-detail record.
    pub result: String,
    pub is_error: bool,
}

/// One complete LLM exchange — the atomic unit persisted as a `turns` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationDetailData {
    pub turn_number: u32,
    pub iteration_number: u32,
    pub system_prompt: String,
    pub messages_sent: Value,
    pub tools_available: Value,
    pub model: String,
    pub max_tokens: u32,
    pub response_content: Value,
    pub stop_reason: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: Value,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}
