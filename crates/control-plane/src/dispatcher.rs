//! Dispatcher (§4.4): picks a worker with spare capacity and forwards
//! a launch request to its worker-local HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use am_protocol::control_api::LaunchContext;
use am_protocol::worker_api::{AgentLaunchSpec, WorkerLaunchRequest, WorkerLaunchResponse};
use thiserror::Error;
use uuid::Uuid;

use crate::registry::WorkerRegistry;

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no worker has free capacity")]
    NoCapacity,
    #[error("selected worker rejected the launch: {0}")]
    WorkerRejected(String),
    #[error("contacting worker: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Registry(#[from] am_domain::error::Error),
}

pub struct Dispatched {
    pub universe_id: String,
    pub worker_id: String,
    pub worker_address: String,
    pub worker_name: String,
}

pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            client: reqwest::Client::new(),
        }
    }

    pub async fn dispatch(
        &self,
        name: Option<String>,
        prompt: String,
        agent_name: Option<String>,
        agent_role: Option<String>,
        model: Option<String>,
        context: Option<LaunchContext>,
    ) -> Result<Dispatched, DispatchError> {
        let worker = self.registry.select_for_dispatch().await?.ok_or(DispatchError::NoCapacity)?;

        let context_strings = context.map(|c| c.as_strings()).unwrap_or_default();
        let task = if context_strings.is_empty() {
            prompt
        } else {
            format!("{prompt}\n\n{}", context_strings.join("\n"))
        };

        let universe_name = name.unwrap_or_else(|| format!("universe-{}", Uuid::new_v4()));
        let request = WorkerLaunchRequest {
            name: universe_name.clone(),
            dimension_id: None,
            agents: vec![AgentLaunchSpec {
                name: agent_name.unwrap_or_else(|| "lead".to_string()),
                role: agent_role.unwrap_or_else(|| "lead".to_string()),
                model,
                task,
            }],
            worktree_path: None,
        };

        let url = format!("{}/launch", worker.address.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(LAUNCH_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::WorkerRejected(format!("{status}: {body}")));
        }

        let parsed: WorkerLaunchResponse = response.json().await?;
        tracing::info!(
            universe_id = %parsed.universe_id,
            worker_id = %worker.id,
            "dispatched launch request"
        );

        Ok(Dispatched {
            universe_id: parsed.universe_id,
            worker_id: worker.id,
            worker_address: worker.address,
            worker_name: worker.name,
        })
    }
}
