//! Connection pool bootstrap.
//!
//! The Conversation Store connects through `sqlx`'s database-agnostic
//! `Any` driver so the same query code serves a Postgres deployment and
//! a SQLite file used for local development, matching the
//! connect-options-from-config pattern the rest of this lineage uses
//! for its own persistence layer.

use std::sync::Once;

use am_domain::error::{Error, Result};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;

static INSTALL_DRIVERS: Once = Once::new();

fn ensure_drivers_installed() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Open (and lazily migrate) the pool backing the `conversations`/`turns`
/// tables. `min_connections`/`max_connections` follow §5's "shared
/// connection pool (minimum 2, maximum 10 connections)".
pub async fn connect(database_url: &str) -> Result<AnyPool> {
    ensure_drivers_installed();

    let pool = AnyPoolOptions::new()
        .min_connections(2)
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| Error::Other(format!("connecting to {database_url}: {e}")))?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Create the two tables described in §3.1 if they don't already exist.
/// Deliberately portable DDL (no JSONB/UUID column types) so the exact
/// same statements run against both backends behind `AnyPool`.
async fn ensure_schema(pool: &AnyPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            universe_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            agent_name TEXT,
            agent_role TEXT,
            model TEXT,
            worker_id TEXT,
            task_prompt TEXT,
            status TEXT NOT NULL DEFAULT 'running',
            error_message TEXT,
            total_turns INTEGER NOT NULL DEFAULT 0,
            total_iterations INTEGER NOT NULL DEFAULT 0,
            total_input_tokens INTEGER NOT NULL DEFAULT 0,
            total_output_tokens INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Other(format!("creating conversations table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            turn_number INTEGER NOT NULL,
            iteration_number INTEGER NOT NULL,
            system_prompt TEXT,
            messages_sent TEXT,
            tools_available TEXT,
            model TEXT,
            max_tokens INTEGER NOT NULL DEFAULT 0,
            response_content TEXT,
            stop_reason TEXT,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            tool_calls TEXT,
            started_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(conversation_id, turn_number, iteration_number)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Other(format!("creating turns table: {e}")))?;

    Ok(())
}

/// Small helper for optional-string columns that some backends return as
/// NULL and others as an absent value entirely.
pub(crate) fn get_opt_str(row: &AnyRow, col: &str) -> Option<String> {
    use sqlx::Row;
    row.try_get::<Option<String>, _>(col).ok().flatten()
}
