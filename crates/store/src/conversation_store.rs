//! Conversation Store (§4.6) — fire-and-forget persistence of
//! `agent_started` / `iteration_detail` / `agent_done` / `agent_error`
//! events into the `conversations` and `turns` tables.
//!
//! No uniqueness constraint is placed on `conversations(universe_id,
//! agent_id)` (see DESIGN.md); instead `agent_started` performs an
//! existence check before inserting, and `iteration_detail` looks up
//! the newest matching row, mirroring the upstream lineage's `ORDER BY
//! created_at DESC LIMIT 1` behavior.

use am_domain::conversation::{Conversation, ConversationStatus, Turn};
use am_domain::error::{Error, Result};
use am_protocol::event::IterationDetailData;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::pool::get_opt_str;

#[derive(Clone)]
pub struct ConversationStore {
    pool: AnyPool,
}

impl ConversationStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// `agent_started` → INSERT a row, unless one is already `running`
    /// for this (universe_id, agent_id) pair (duplicate delivery).
    #[allow(clippy::too_many_arguments)]
    pub async fn agent_started(
        &self,
        universe_id: &str,
        agent_id: &str,
        agent_name: Option<&str>,
        agent_role: Option<&str>,
        model: Option<&str>,
        worker_id: Option<&str>,
        task_prompt: Option<&str>,
    ) -> Result<()> {
        let existing: Option<AnyRowCount> = sqlx::query_as(
            "SELECT id FROM conversations WHERE universe_id = ? AND agent_id = ? AND status = 'running'",
        )
        .bind(universe_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if existing.is_some() {
            tracing::debug!(universe_id, agent_id, "agent_started: conversation already running, ignoring duplicate");
            return Ok(());
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO conversations
                (id, universe_id, agent_id, agent_name, agent_role, model, worker_id,
                 task_prompt, status, total_turns, total_iterations,
                 total_input_tokens, total_output_tokens, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'running', 0, 0, 0, 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(universe_id)
        .bind(agent_id)
        .bind(agent_name)
        .bind(agent_role)
        .bind(model)
        .bind(worker_id)
        .bind(task_prompt)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        tracing::info!(universe_id, agent_id, conversation_id = %id, "conversation started");
        Ok(())
    }

    /// `iteration_detail` → INSERT a turn row and update aggregates.
    /// If no running (or any) conversation exists for this key, the turn
    /// is dropped and a warning logged — deliberate data loss under
    /// pathological disorder, per §4.6.
    pub async fn iteration_detail(
        &self,
        universe_id: &str,
        agent_id: &str,
        detail: &IterationDetailData,
    ) -> Result<()> {
        let Some(conversation_id) = self.latest_conversation_id(universe_id, agent_id).await? else {
            tracing::warn!(
                universe_id,
                agent_id,
                "iteration_detail arrived with no matching conversation; dropping turn"
            );
            return Ok(());
        };

        let turn_id = Uuid::new_v4();
        let now = Utc::now();
        let insert_result = sqlx::query(
            r#"
            INSERT INTO turns
                (id, conversation_id, turn_number, iteration_number, system_prompt,
                 messages_sent, tools_available, model, max_tokens, response_content,
                 stop_reason, input_tokens, output_tokens, tool_calls, started_at,
                 duration_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(turn_id.to_string())
        .bind(conversation_id.to_string())
        .bind(detail.turn_number as i64)
        .bind(detail.iteration_number as i64)
        .bind(&detail.system_prompt)
        .bind(detail.messages_sent.to_string())
        .bind(detail.tools_available.to_string())
        .bind(&detail.model)
        .bind(detail.max_tokens as i64)
        .bind(detail.response_content.to_string())
        .bind(&detail.stop_reason)
        .bind(detail.input_tokens as i64)
        .bind(detail.output_tokens as i64)
        .bind(detail.tool_calls.to_string())
        .bind(detail.started_at.to_rfc3339())
        .bind(detail.duration_ms as i64)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await;

        match insert_result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Unique-constraint violation on (conversation_id, turn_number,
                // iteration_number) is an at-most-once duplicate from a
                // reconnect re-delivery (§5) — absorb it silently.
                tracing::debug!(error = %db_err, "turn insert conflict, treating as duplicate delivery");
                return Ok(());
            }
            Err(e) => return Err(db_err(e)),
        }

        sqlx::query(
            r#"
            UPDATE conversations
            SET total_iterations = total_iterations + 1,
                total_turns = CASE WHEN ? > total_turns THEN ? ELSE total_turns END,
                total_input_tokens = total_input_tokens + ?,
                total_output_tokens = total_output_tokens + ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(detail.turn_number as i64)
        .bind(detail.turn_number as i64)
        .bind(detail.input_tokens as i64)
        .bind(detail.output_tokens as i64)
        .bind(now.to_rfc3339())
        .bind(conversation_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// `agent_done` → close out the conversation, only if still running.
    pub async fn agent_done(&self, universe_id: &str, agent_id: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'completed', completed_at = ?, updated_at = ?
            WHERE universe_id = ? AND agent_id = ? AND status = 'running'
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(universe_id)
        .bind(agent_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// `agent_error` → close out the conversation with an error message.
    pub async fn agent_error(&self, universe_id: &str, agent_id: &str, message: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'error', error_message = ?, updated_at = ?
            WHERE universe_id = ? AND agent_id = ? AND status = 'running'
            "#,
        )
        .bind(message)
        .bind(now.to_rfc3339())
        .bind(universe_id)
        .bind(agent_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn by_universe(&self, universe_id: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE universe_id = ? ORDER BY created_at ASC",
        )
        .bind(universe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_conversation).collect()
    }

    pub async fn turns(&self, conversation_id: Uuid) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            "SELECT * FROM turns WHERE conversation_id = ? ORDER BY turn_number ASC, iteration_number ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_turn).collect()
    }

    pub async fn turn(&self, conversation_id: Uuid, turn_id: Uuid) -> Result<Option<Turn>> {
        let row = sqlx::query("SELECT * FROM turns WHERE conversation_id = ? AND id = ?")
            .bind(conversation_id.to_string())
            .bind(turn_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_turn).transpose()
    }

    async fn latest_conversation_id(&self, universe_id: &str, agent_id: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            "SELECT id FROM conversations WHERE universe_id = ? AND agent_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(universe_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| {
            let raw: String = r.try_get("id").map_err(db_err)?;
            Uuid::parse_str(&raw).map_err(|e| Error::Other(format!("corrupt conversation id: {e}")))
        })
        .transpose()
    }
}

#[derive(sqlx::FromRow)]
struct AnyRowCount {
    #[allow(dead_code)]
    id: String,
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Other(format!("store: {e}"))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("corrupt timestamp '{raw}': {e}")))
}

fn row_to_conversation(row: &sqlx::any::AnyRow) -> Result<Conversation> {
    let id_raw: String = row.try_get("id").map_err(db_err)?;
    let created_raw: String = row.try_get("created_at").map_err(db_err)?;
    let updated_raw: String = row.try_get("updated_at").map_err(db_err)?;
    let completed_raw = get_opt_str(row, "completed_at");
    let status_raw: String = row.try_get("status").map_err(db_err)?;

    Ok(Conversation {
        id: Uuid::parse_str(&id_raw).map_err(|e| Error::Other(e.to_string()))?,
        universe_id: row.try_get("universe_id").map_err(db_err)?,
        agent_id: row.try_get("agent_id").map_err(db_err)?,
        agent_name: get_opt_str(row, "agent_name"),
        agent_role: get_opt_str(row, "agent_role"),
        model: get_opt_str(row, "model"),
        worker_id: get_opt_str(row, "worker_id"),
        task_prompt: get_opt_str(row, "task_prompt"),
        status: parse_conversation_status(&status_raw),
        error_message: get_opt_str(row, "error_message"),
        total_turns: row.try_get::<i64, _>("total_turns").map_err(db_err)? as i32,
        total_iterations: row.try_get::<i64, _>("total_iterations").map_err(db_err)? as i32,
        total_input_tokens: row.try_get("total_input_tokens").map_err(db_err)?,
        total_output_tokens: row.try_get("total_output_tokens").map_err(db_err)?,
        created_at: parse_ts(&created_raw)?,
        completed_at: completed_raw.map(|s| parse_ts(&s)).transpose()?,
        updated_at: parse_ts(&updated_raw)?,
    })
}

fn parse_conversation_status(raw: &str) -> ConversationStatus {
    match raw {
        "completed" => ConversationStatus::Completed,
        "error" => ConversationStatus::Error,
        _ => ConversationStatus::Running,
    }
}

fn row_to_turn(row: &sqlx::any::AnyRow) -> Result<Turn> {
    let id_raw: String = row.try_get("id").map_err(db_err)?;
    let conv_raw: String = row.try_get("conversation_id").map_err(db_err)?;
    let started_raw: String = row.try_get("started_at").map_err(db_err)?;
    let created_raw: String = row.try_get("created_at").map_err(db_err)?;
    let messages_sent: String = row.try_get("messages_sent").map_err(db_err)?;
    let tools_available: String = row.try_get("tools_available").map_err(db_err)?;
    let response_content: String = row.try_get("response_content").map_err(db_err)?;
    let tool_calls: String = row.try_get("tool_calls").map_err(db_err)?;

    Ok(Turn {
        id: Uuid::parse_str(&id_raw).map_err(|e| Error::Other(e.to_string()))?,
        conversation_id: Uuid::parse_str(&conv_raw).map_err(|e| Error::Other(e.to_string()))?,
        turn_number: row.try_get::<i64, _>("turn_number").map_err(db_err)? as i32,
        iteration_number: row.try_get::<i64, _>("iteration_number").map_err(db_err)? as i32,
        system_prompt: get_opt_str(row, "system_prompt"),
        messages_sent: serde_json::from_str(&messages_sent).unwrap_or(serde_json::Value::Null),
        tools_available: serde_json::from_str(&tools_available).unwrap_or(serde_json::Value::Null),
        model: get_opt_str(row, "model"),
        max_tokens: row.try_get::<i64, _>("max_tokens").map_err(db_err)? as i32,
        response_content: serde_json::from_str(&response_content).unwrap_or(serde_json::Value::Null),
        stop_reason: get_opt_str(row, "stop_reason"),
        input_tokens: row.try_get("input_tokens").map_err(db_err)?,
        output_tokens: row.try_get("output_tokens").map_err(db_err)?,
        tool_calls: serde_json::from_str(&tool_calls).unwrap_or(serde_json::Value::Null),
        started_at: parse_ts(&started_raw)?,
        duration_ms: row.try_get("duration_ms").map_err(db_err)?,
        created_at: parse_ts(&created_raw)?,
    })
}
