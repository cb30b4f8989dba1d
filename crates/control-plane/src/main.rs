use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use am_control_plane::cli::{self, Cli, Command};
use am_control_plane::credential_broker::{CredentialBroker, EnvSecretSource};
use am_control_plane::dispatcher::Dispatcher;
use am_control_plane::fanout::EventFanout;
use am_control_plane::reaper::LivenessReaper;
use am_control_plane::registry::WorkerRegistry;
use am_control_plane::{http, Config};
use am_control_plane::state::AppState;
use am_domain::config::ConfigSeverity;
use am_store::ConversationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path) = cli::load_config()?;
            run_server(Arc::new(config)).await
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
            println!("am-control-plane {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,am_control_plane=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("agentmesh control plane starting");

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

    let pool = am_store::connect(&config.database.url)
        .await
        .context("connecting to conversation store")?;
    let store = Arc::new(ConversationStore::new(pool.clone()));

    let registry = Arc::new(WorkerRegistry::new(pool));
    registry.ensure_schema().await.context("creating worker registry schema")?;

    let dispatcher = Arc::new(Dispatcher::new(registry.clone()));
    let broker = Arc::new(CredentialBroker::new(
        registry.clone(),
        Arc::new(EnvSecretSource),
        config.credentials.allowed_keys.clone(),
    ));
    let fanout = Arc::new(EventFanout::new(store.clone()));

    let state = AppState {
        config: config.clone(),
        registry: registry.clone(),
        dispatcher,
        broker,
        fanout,
        store,
    };

    let cancel = CancellationToken::new();
    let reaper = LivenessReaper::new(registry, config.reaper.clone());
    let reaper_cancel = cancel.clone();
    let reaper_task = tokio::spawn(async move { reaper.run(reaper_cancel).await });

    let cors_layer = build_cors_layer(&config.server.cors);
    let router = http::router(state).layer(cors_layer);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "control plane listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving control plane HTTP")?;

    cancel.cancel();
    reaper_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn build_cors_layer(cors: &am_domain::config::CorsConfig) -> CorsLayer {
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
