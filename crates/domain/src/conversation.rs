use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Running,
    Completed,
    Error,
}

/// Control-plane persistence of one agent's run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub universe_id: String,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub agent_role: Option<String>,
    pub model: Option<String>,
    pub worker_id: Option<String>,
    pub task_prompt: Option<String>,
    pub status: ConversationStatus,
    pub error_message: Option<String>,
    pub total_turns: i32,
    pub total_iterations: i32,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One LLM call plus any tool calls it triggered. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub turn_number: i32,
    pub iteration_number: i32,
    pub system_prompt: Option<String>,
    pub messages_sent: serde_json::Value,
    pub tools_available: serde_json::Value,
    pub model: Option<String>,
    pub max_tokens: i32,
    pub response_content: serde_json::Value,
    pub stop_reason: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub tool_calls: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}
