//! The control-plane HTTP/WS surface (§6): worker registration and
//! heartbeat, the credential broker, universe launch, cached universe
//! listing, conversation/turn history, and the two WebSocket endpoints.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use uuid::Uuid;

use am_domain::error::Error as DomainError;
use am_protocol::control_api::{
    CredentialResponse, DeregisterResponse, HeartbeatRequest, LaunchRequest, LaunchResponse, ListWorkersQuery,
    RegisterRequest, RegisterResponse,
};
use am_protocol::event::WorkerEvent;

use crate::credential_broker::BrokerError;
use crate::dispatcher::DispatchError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/workers/register", post(register_worker))
        .route("/api/workers/:id/heartbeat", post(heartbeat))
        .route("/api/workers/:id/deregister", post(deregister))
        .route("/api/workers", get(list_workers))
        .route("/api/workers/:id", get(get_worker))
        .route("/api/workers/credentials/:key_name", get(get_credential))
        .route("/api/universes/launch", post(launch_universe))
        .route("/api/universes", get(list_universes))
        .route("/api/conversations/by-universe/:id", get(conversations_by_universe))
        .route("/api/conversations/:id/turns", get(turns_for_conversation))
        .route("/api/conversations/:id/turns/:turn_id", get(single_turn))
        .route("/ws/worker/:id", get(worker_ws))
        .route("/ws/universes", get(universes_ws))
        .with_state(state)
}

fn domain_error_response(err: DomainError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Auth(_) => StatusCode::UNAUTHORIZED,
        DomainError::Config(_) | DomainError::Provider { .. } => StatusCode::BAD_REQUEST,
        DomainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

/// Ambient liveness probe every binary in this lineage exposes publicly,
/// independent of the Liveness Reaper's direct pings against worker
/// addresses (§6).
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn register_worker(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> impl IntoResponse {
    match state
        .registry
        .register(
            req.worker_id,
            req.hostname,
            req.worker_name,
            req.worker_address,
            req.max_concurrent_agents,
            req.capabilities,
        )
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(RegisterResponse {
                worker: (&outcome.worker).into(),
                auth_token: outcome.auth_token,
            }),
        )
            .into_response(),
        Err(e) => domain_error_response(e).into_response(),
    }
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    match state.registry.heartbeat(&id, req.current_agents, &req.status).await {
        Ok(worker) => (StatusCode::OK, Json(am_domain::worker::WorkerView::from(&worker))).into_response(),
        Err(e) => domain_error_response(e).into_response(),
    }
}

async fn deregister(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.registry.deregister(&id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(DeregisterResponse {
                message: "deregistered".into(),
                worker_id: id,
            }),
        )
            .into_response(),
        Err(e) => domain_error_response(e).into_response(),
    }
}

async fn list_workers(State(state): State<AppState>, Query(q): Query<ListWorkersQuery>) -> impl IntoResponse {
    match state.registry.list(q.status.as_deref()).await {
        Ok(workers) => {
            let views: Vec<am_domain::worker::WorkerView> = workers.iter().map(Into::into).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => domain_error_response(e).into_response(),
    }
}

async fn get_worker(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.registry.get(&id).await {
        Ok(Some(worker)) => (StatusCode::OK, Json(am_domain::worker::WorkerView::from(&worker))).into_response(),
        Ok(None) => domain_error_response(DomainError::NotFound(format!("worker '{id}' not found"))).into_response(),
        Err(e) => domain_error_response(e).into_response(),
    }
}

async fn get_credential(
    State(state): State<AppState>,
    Path(key_name): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    match state.broker.fetch(token, &key_name).await {
        Ok(value) => (
            StatusCode::OK,
            Json(CredentialResponse {
                key_name,
                key_value: value,
            }),
        )
            .into_response(),
        Err(BrokerError::Unauthorized) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid worker token" }))).into_response()
        }
        Err(BrokerError::Offline) => {
            (StatusCode::FORBIDDEN, Json(json!({ "error": "worker is offline" }))).into_response()
        }
        Err(BrokerError::NotAllowed(k)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("key '{k}' is not allow-listed") }))).into_response()
        }
        Err(BrokerError::NotFound(k)) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": format!("no value configured for '{k}'") }))).into_response()
        }
    }
}

async fn launch_universe(State(state): State<AppState>, Json(req): Json<LaunchRequest>) -> impl IntoResponse {
    match state
        .dispatcher
        .dispatch(req.name, req.prompt, req.agent_name, req.agent_role, req.model, req.context)
        .await
    {
        Ok(dispatched) => (
            StatusCode::OK,
            Json(LaunchResponse {
                universe_id: dispatched.universe_id,
                worker_id: dispatched.worker_id,
                worker_address: dispatched.worker_address,
                worker_name: dispatched.worker_name.clone(),
                name: dispatched.worker_name,
            }),
        )
            .into_response(),
        Err(DispatchError::NoCapacity) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "no worker has free capacity" }))).into_response()
        }
        Err(DispatchError::WorkerRejected(msg)) => {
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": format!("worker rejected launch: {msg}") }))).into_response()
        }
        Err(DispatchError::Transport(e)) => {
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": format!("worker unreachable: {e}") }))).into_response()
        }
        Err(DispatchError::Registry(e)) => domain_error_response(e).into_response(),
    }
}

async fn list_universes(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.fanout.snapshot();
    Json(snapshot.universes)
}

async fn conversations_by_universe(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.by_universe(&id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => domain_error_response(e).into_response(),
    }
}

async fn turns_for_conversation(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(conversation_id) = Uuid::parse_str(&id) else {
        return domain_error_response(DomainError::NotFound(format!("invalid conversation id '{id}'"))).into_response();
    };
    match state.store.turns(conversation_id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => domain_error_response(e).into_response(),
    }
}

async fn single_turn(State(state): State<AppState>, Path((id, turn_id)): Path<(String, String)>) -> impl IntoResponse {
    let (Ok(conversation_id), Ok(turn_id)) = (Uuid::parse_str(&id), Uuid::parse_str(&turn_id)) else {
        return domain_error_response(DomainError::NotFound("invalid id".into())).into_response();
    };
    match state.store.turn(conversation_id, turn_id).await {
        Ok(Some(turn)) => (StatusCode::OK, Json(turn)).into_response(),
        Ok(None) => domain_error_response(DomainError::NotFound(format!("turn '{turn_id}' not found"))).into_response(),
        Err(e) => domain_error_response(e).into_response(),
    }
}

/// `WS /ws/worker/{id}` — a worker's persistent event stream.
async fn worker_ws(ws: WebSocketUpgrade, State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_worker_socket(socket, state, id))
}

async fn handle_worker_socket(mut socket: WebSocket, state: AppState, worker_id: String) {
    tracing::info!(worker_id = %worker_id, "worker event socket connected");
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<WorkerEvent>(&text) {
                Ok(event) => {
                    if let Err(e) = state.fanout.handle(event).await {
                        tracing::warn!(worker_id = %worker_id, error = %e, "failed to process worker event");
                    }
                }
                Err(e) => tracing::warn!(worker_id = %worker_id, error = %e, "ignoring unparseable worker event"),
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(worker_id = %worker_id, error = %e, "worker event socket error");
                break;
            }
        }
    }
    tracing::info!(worker_id = %worker_id, "worker event socket disconnected");
}

/// `WS /ws/universes` — dashboard subscription: snapshot then relay.
async fn universes_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_dashboard_socket(socket, state))
}

async fn handle_dashboard_socket(mut socket: WebSocket, state: AppState) {
    let snapshot = am_protocol::cache::DashboardFrame::Snapshot(state.fanout.snapshot());
    let Ok(frame) = serde_json::to_string(&snapshot) else {
        return;
    };
    if socket.send(Message::Text(frame)).await.is_err() {
        return;
    }

    let mut events = state.fanout.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let frame = am_protocol::cache::DashboardFrame::Event(event);
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "dashboard socket lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
    tracing::info!("dashboard socket disconnected");
}
