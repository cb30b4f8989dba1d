use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use am_domain::config::ConfigSeverity;
use am_llm::LlmClient;
use am_tools::executor::ToolExecutor;
use am_worker::cli::{self, Cli, Command};
use am_worker::http::{self, WorkerState};
use am_worker::Config;
use am_worker_sdk::backend_client::{BackendClient, BackendClientConfig, BackendCredentialProvider};
use am_worker_sdk::event_queue::EventQueue;
use am_worker_sdk::identity;
use am_worker_sdk::universe_manager::UniverseManager;

const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path) = cli::load_config()?;
            run_worker(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Version) => {
            println!("am-worker {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,am_worker=debug")))
        .json()
        .init();
}

async fn run_worker(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("agentmesh worker starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let worker_id = identity::load_or_create().await.context("loading worker identity")?;
    let hostname = Config::hostname();
    let worker_address = config
        .worker_address
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));

    let backend_config = BackendClientConfig {
        control_plane_url: config.control_plane_url.clone(),
        hostname: hostname.clone(),
        worker_name: config.worker_name.clone(),
        worker_address: Some(worker_address),
        max_concurrent_agents: config.max_concurrent_agents,
        capabilities: config.capabilities.clone(),
        heartbeat_interval: Duration::from_secs(config.heartbeat_interval_sec),
    };
    let backend = Arc::new(BackendClient::new(backend_config, worker_id.clone()));

    let shutdown = CancellationToken::new();
    backend
        .register_with_backoff(&shutdown)
        .await
        .context("registering with control plane")?;
    tracing::info!(worker_id = %worker_id, "registered with control plane");

    let credential_provider = Arc::new(BackendCredentialProvider::new(backend.clone(), config.credential_key_name.clone()));
    let llm = Arc::new(LlmClient::new(config.llm_base_url.clone(), config.llm_model.clone(), credential_provider)?);
    let tools = Arc::new(ToolExecutor::new(format!("{}/api", config.control_plane_url.trim_end_matches('/'))));
    let events = Arc::new(EventQueue::new());
    let manager = Arc::new(UniverseManager::with_loop_bounds(
        worker_id.clone(),
        llm,
        tools,
        events.clone(),
        config.max_turns,
        config.max_iterations,
    ));

    let heartbeat_manager = manager.clone();
    let heartbeat_shutdown = shutdown.clone();
    let heartbeat_backend = backend.clone();
    let heartbeat_task = tokio::spawn(async move {
        heartbeat_backend
            .run_heartbeat_loop(move || heartbeat_manager.running_agent_count(), heartbeat_shutdown)
            .await;
    });

    let event_backend = backend.clone();
    let event_queue = events.clone();
    let event_shutdown = shutdown.clone();
    let event_task = tokio::spawn(async move {
        event_backend.run_event_loop(event_queue, event_shutdown).await;
    });

    let state = WorkerState {
        worker_id: worker_id.clone(),
        hostname,
        config: config.clone(),
        manager: manager.clone(),
    };
    let router = http::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "worker listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving worker HTTP")?;

    tracing::info!("shutting down: stopping all agents");
    manager.stop_all().await;
    shutdown.cancel();
    heartbeat_task.abort();
    event_task.abort();

    let deregister_url = format!("{}/api/workers/{}/deregister", config.control_plane_url, worker_id);
    let client = reqwest::Client::new();
    match tokio::time::timeout(DEREGISTER_TIMEOUT, client.post(&deregister_url).send()).await {
        Ok(Ok(_)) => tracing::info!("deregistered from control plane"),
        Ok(Err(e)) => tracing::warn!(error = %e, "deregister request failed"),
        Err(_) => tracing::warn!("deregister request timed out"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
