//! Agent Loop (§4.9): the outer turn loop and the inner tool-use loop
//! that together drive one agent from launch to completion.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use am_domain::error::Result;
use am_domain::tool::{Message, MessageContent, ToolDefinition};
use am_domain::universe::{Decision, UniverseState};
use am_llm::{ChatResponse, LlmClient, StopReason};
use am_protocol::event::{
    AgentDoneData, AgentErrorData, AgentStartedData, EventType, IterationDetailData, LlmResponseData, LlmResponseUsage,
    ToolCallData, ToolResultData, TurnEndData, TurnStartData, WorkerEvent,
};
use am_tools::executor::{tool_definitions_for_role, ToolExecutor};
use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::event_queue::EventQueue;

pub const DEFAULT_MAX_TURNS: u32 = 10;
pub const DEFAULT_MAX_ITERATIONS: u32 = 200;
const TEXT_PREVIEW_CHARS: usize = 500;
const TOOL_RESULT_TRUNCATE_CHARS: usize = 1000;

pub struct AgentLoopConfig {
    pub universe_id: String,
    pub worker_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub role: String,
    pub model: Option<String>,
    pub task_prompt: String,
    pub worktree_path: Option<PathBuf>,
    pub max_turns: u32,
    pub max_iterations: u32,
}

impl AgentLoopConfig {
    pub fn with_defaults(
        universe_id: String,
        worker_id: String,
        agent_id: String,
        agent_name: String,
        role: String,
        model: Option<String>,
        task_prompt: String,
        worktree_path: Option<PathBuf>,
    ) -> Self {
        Self {
            universe_id,
            worker_id,
            agent_id,
            agent_name,
            role,
            model,
            task_prompt,
            worktree_path,
            max_turns: DEFAULT_MAX_TURNS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Final status an agent loop run settles into. The Universe Manager
/// uses this to update the `AgentHandle` and reap the universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    Completed,
    Paused,
    Error,
}

pub struct AgentLoop {
    config: AgentLoopConfig,
    llm: Arc<LlmClient>,
    tools: Arc<ToolExecutor>,
    events: Arc<EventQueue>,
    state: Arc<RwLock<UniverseState>>,
    /// The universe's single `state_version` counter, shared by every
    /// agent task in the universe — never derived from this agent's own
    /// turn number, which would make the version go backwards whenever
    /// two agents in the same universe are mid-turn at different turns.
    state_version: Arc<AtomicU64>,
}

impl AgentLoop {
    pub fn new(
        config: AgentLoopConfig,
        llm: Arc<LlmClient>,
        tools: Arc<ToolExecutor>,
        events: Arc<EventQueue>,
        state: Arc<RwLock<UniverseState>>,
        state_version: Arc<AtomicU64>,
    ) -> Self {
        Self {
            config,
            llm,
            tools,
            events,
            state,
            state_version,
        }
    }

    /// Run the outer loop to completion, cancellation, or error. Never
    /// returns an `Err` — failures are folded into `AgentOutcome::Error`
    /// after emitting `agent_error`, matching the tool-boundary-never-
    /// throws discipline used throughout this lineage.
    pub async fn run(&self, cancel: CancellationToken) -> AgentOutcome {
        self.emit(
            EventType::AgentStarted,
            Some(AgentStartedData {
                role: self.config.role.clone(),
                model: self.config.model.clone().unwrap_or_default(),
                task_prompt: self.config.task_prompt.clone(),
            }),
        )
        .await;

        let tool_defs = tool_definitions_for_role(&self.config.role, self.config.worktree_path.as_ref());
        let persist_messages = self.config.role == "task-creator";
        let mut messages: Vec<Message> = Vec::new();

        for turn in 1..=self.config.max_turns {
            if cancel.is_cancelled() {
                tracing::info!(agent_id = %self.config.agent_id, "agent loop cancelled, pausing");
                return AgentOutcome::Paused;
            }

            self.emit(
                EventType::TurnStart,
                Some(TurnStartData {
                    turn,
                    max_turns: self.config.max_turns,
                }),
            )
            .await;

            let system = self.build_system_prompt();

            if !persist_messages {
                messages = vec![Message::user(self.config.task_prompt.clone())];
            } else if messages.is_empty() {
                messages.push(Message::user(self.config.task_prompt.clone()));
            }

            let inner = tokio::select! {
                r = self.run_inner_loop(&system, &mut messages, &tool_defs, turn) => r,
                _ = cancel.cancelled() => {
                    tracing::info!(agent_id = %self.config.agent_id, "agent loop cancelled mid-turn, pausing");
                    return AgentOutcome::Paused;
                }
            };

            match inner {
                Ok(done) => {
                    {
                        let mut state = self.state.write();
                        state.context_summary = format!("{} turns completed", turn);
                    }
                    let state_version = self.state_version.fetch_add(1, Ordering::SeqCst) + 1;
                    self.emit(EventType::TurnEnd, Some(TurnEndData { state_version })).await;

                    if done {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(agent_id = %self.config.agent_id, error = %e, "agent loop failed");
                    self.emit(EventType::AgentError, Some(AgentErrorData { error: e.to_string() })).await;
                    return AgentOutcome::Error;
                }
            }
        }

        self.emit(
            EventType::AgentDone,
            Some(AgentDoneData {
                total_turns: self.config.max_turns,
            }),
        )
        .await;
        AgentOutcome::Completed
    }

    /// Base role description plus a compact summary of shared state.
    fn build_system_prompt(&self) -> String {
        let state = self.state.read();
        let recent_decisions: Vec<String> = state
            .decisions
            .iter()
            .rev()
            .take(5)
            .map(|d: &Decision| d.decision.clone())
            .collect();

        let mut prompt = format!("You are an agent with role '{}'.\n", self.config.role);
        if !state.context_summary.is_empty() {
            prompt.push_str(&format!("Context so far: {}\n", state.context_summary));
        }
        if !recent_decisions.is_empty() {
            prompt.push_str(&format!("Recent decisions: {}\n", recent_decisions.join("; ")));
        }
        prompt
    }

    /// Inner tool-use loop. Returns `Ok(true)` if the outer loop should
    /// stop (no further `tool_use` in the final assistant message).
    async fn run_inner_loop(
        &self,
        system: &str,
        messages: &mut Vec<Message>,
        tools: &[ToolDefinition],
        turn_number: u32,
    ) -> Result<bool> {
        for iteration in 1..=self.config.max_iterations {
            let messages_snapshot = messages.clone();
            let started_at = Utc::now();
            let timer = Instant::now();

            let response: ChatResponse = self
                .llm
                .chat(messages, self.config.model.as_deref(), Some(system), tools, None)
                .await?;

            messages.push(assistant_message(&response));

            self.emit(
                EventType::LlmResponse,
                Some(LlmResponseData {
                    text_preview: response.text_preview(TEXT_PREVIEW_CHARS),
                    usage: LlmResponseUsage {
                        input_tokens: response.usage.input_tokens,
                        output_tokens: response.usage.output_tokens,
                    },
                    stop_reason: response.stop_reason.as_str().to_string(),
                    iteration,
                }),
            )
            .await;

            let tool_calls = response.tool_calls();
            let mut tool_call_records = Vec::new();

            if response.stop_reason == StopReason::ToolUse && !tool_calls.is_empty() {
                let mut result_parts = Vec::new();
                for call in &tool_calls {
                    self.emit(
                        EventType::ToolCall,
                        Some(ToolCallData {
                            call_id: call.call_id.clone(),
                            tool_name: call.tool_name.clone(),
                            arguments: call.arguments.clone(),
                        }),
                    )
                    .await;

                    let worktree = self.config.worktree_path.clone().unwrap_or_else(|| PathBuf::from("."));
                    let result = self.tools.execute(&worktree, &call.tool_name, &call.arguments).await;
                    let truncated: String = result.chars().take(TOOL_RESULT_TRUNCATE_CHARS).collect();
                    let is_error = result.starts_with("Error:");

                    self.emit(
                        EventType::ToolResult,
                        Some(ToolResultData {
                            call_id: call.call_id.clone(),
                            tool_name: call.tool_name.clone(),
                            result: truncated.clone(),
                            is_error,
                        }),
                    )
                    .await;

                    tool_call_records.push(serde_json::json!({
                        "call_id": call.call_id,
                        "tool_name": call.tool_name,
                        "result": truncated,
                        "is_error": is_error,
                    }));
                    result_parts.push(am_domain::tool::ContentPart::ToolResult {
                        tool_use_id: call.call_id.clone(),
                        content: result,
                        is_error,
                    });
                }

                messages.push(Message {
                    role: am_domain::tool::Role::User,
                    content: MessageContent::Parts(result_parts),
                });

                self.emit_iteration_detail(
                    system,
                    &messages_snapshot,
                    tools,
                    &response,
                    turn_number,
                    iteration,
                    started_at,
                    timer.elapsed(),
                    tool_call_records,
                )
                .await;
                continue;
            }

            self.emit_iteration_detail(
                system,
                &messages_snapshot,
                tools,
                &response,
                turn_number,
                iteration,
                started_at,
                timer.elapsed(),
                tool_call_records,
            )
            .await;

            return Ok(response.stop_reason != StopReason::ToolUse);
        }

        // Iteration budget exhausted without a clean stop; treat as turn-complete.
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_iteration_detail(
        &self,
        system: &str,
        messages_snapshot: &[Message],
        tools: &[ToolDefinition],
        response: &ChatResponse,
        turn_number: u32,
        iteration: u32,
        started_at: chrono::DateTime<Utc>,
        elapsed: Duration,
        tool_calls: Vec<serde_json::Value>,
    ) {
        let detail = IterationDetailData {
            turn_number,
            iteration_number: iteration,
            system_prompt: system.to_string(),
            messages_sent: serde_json::to_value(messages_snapshot).unwrap_or_default(),
            tools_available: serde_json::to_value(tools).unwrap_or_default(),
            model: self.config.model.clone().unwrap_or_default(),
            max_tokens: 4096,
            response_content: response.raw_content.clone(),
            stop_reason: response.stop_reason.as_str().to_string(),
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            tool_calls: serde_json::Value::Array(tool_calls),
            started_at,
            duration_ms: elapsed.as_millis() as u64,
        };
        self.emit(EventType::IterationDetail, Some(detail)).await;
    }

    async fn emit(&self, event_type: EventType, data: Option<impl serde::Serialize>) {
        let mut event = WorkerEvent::new(event_type, self.config.worker_id.clone(), self.config.universe_id.clone())
            .with_agent(self.config.agent_id.clone(), self.config.agent_name.clone());
        if let Some(d) = data {
            event = event.with_data(d);
        }
        self.events.push(event).await;
    }
}

fn assistant_message(response: &ChatResponse) -> Message {
    Message {
        role: am_domain::tool::Role::Assistant,
        content: MessageContent::Parts(response.content.clone()),
    }
}
