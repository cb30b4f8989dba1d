//! Worker-local HTTP surface (§6): health/info probes plus the launch
//! and universe-introspection routes the control plane's Dispatcher
//! calls into.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use am_domain::error::Error as DomainError;
use am_protocol::worker_api::{
    AgentLaunchResponse, HealthResponse, WorkerInfoResponse, WorkerLaunchRequest, WorkerLaunchResponse,
};
use am_worker_sdk::{AgentConfig, UniverseManager};

use crate::config::Config;

#[derive(Clone)]
pub struct WorkerState {
    pub worker_id: String,
    pub hostname: String,
    pub config: Arc<Config>,
    pub manager: Arc<UniverseManager>,
}

pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/launch", post(launch))
        .route("/universes", get(list_universes))
        .route("/universes/:id", get(get_universe))
        .route("/universes/:id/agents", post(launch_agent))
        .with_state(state)
}

fn domain_error_response(err: DomainError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse::default())
}

async fn info(State(state): State<WorkerState>) -> impl IntoResponse {
    Json(WorkerInfoResponse {
        worker_id: state.worker_id.clone(),
        hostname: state.hostname.clone(),
        name: state.config.worker_name.clone().unwrap_or_else(|| state.hostname.clone()),
        current_agents: state.manager.running_agent_count(),
        max_concurrent_agents: state.config.max_concurrent_agents,
        capabilities: state.config.capabilities.clone(),
        universes: state.manager.list_universes(),
    })
}

async fn launch(State(state): State<WorkerState>, Json(req): Json<WorkerLaunchRequest>) -> impl IntoResponse {
    let agents = req
        .agents
        .into_iter()
        .map(|a| AgentConfig {
            name: a.name,
            role: a.role,
            model: a.model,
            task_prompt: a.task,
        })
        .collect();

    let universe_id = state
        .manager
        .launch_universe(req.name, req.dimension_id, agents, req.worktree_path)
        .await;

    (
        StatusCode::OK,
        Json(WorkerLaunchResponse {
            universe_id,
            status: "launched".into(),
        }),
    )
        .into_response()
}

async fn list_universes(State(state): State<WorkerState>) -> impl IntoResponse {
    Json(state.manager.list_universes())
}

async fn get_universe(State(state): State<WorkerState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.manager.get_universe(&id) {
        Some(universe) => (StatusCode::OK, Json(universe)).into_response(),
        None => domain_error_response(am_worker_sdk::universe_manager::unknown_universe(&id)).into_response(),
    }
}

#[derive(Debug, serde::Deserialize)]
struct LaunchAgentRequest {
    name: String,
    role: String,
    #[serde(default)]
    model: Option<String>,
    task: String,
    #[serde(default)]
    worktree_path: Option<String>,
}

async fn launch_agent(
    State(state): State<WorkerState>,
    Path(universe_id): Path<String>,
    Json(req): Json<LaunchAgentRequest>,
) -> impl IntoResponse {
    let worktree_path = req
        .worktree_path
        .or_else(|| state.manager.get_universe(&universe_id).and_then(|u| u.worktree_path));

    match state
        .manager
        .launch_agent(&universe_id, req.name, req.role, req.model, req.task, worktree_path)
        .await
    {
        Some(agent_id) => (
            StatusCode::OK,
            Json(AgentLaunchResponse {
                agent_id,
                status: "launched".into(),
            }),
        )
            .into_response(),
        None => domain_error_response(am_worker_sdk::universe_manager::unknown_universe(&universe_id)).into_response(),
    }
}
