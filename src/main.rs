mod admission;
mod api;
mod config;
mod error;
mod executor;
mod language;
mod metrics;
mod middleware;
mod models;
mod report;
mod sandbox;
mod validation;
mod workspace;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    admission::AdmissionGate,
    config::{EngineConfig, LogFormat},
    executor::Executor,
    metrics::MetricsRegistry,
    sandbox::SandboxFactory,
    workspace::WorkspaceManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("failed to build engine config")?;
    init_tracing(&config);

    let backend = SandboxFactory::from_config(&config);
    let executor = Executor::new(
        backend,
        WorkspaceManager::new(config.workspace_root.clone()),
        AdmissionGate::new(config.max_concurrent_executions, config.admission_wait),
        config.limits.clone(),
        Arc::new(MetricsRegistry::new()),
    );

    let app = api::routes(executor, config.max_body_bytes);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("failed to bind listener")?;

    tracing::info!(
        addr = %config.bind_addr,
        runtime = %config.container_runtime,
        workspace_root = %config.workspace_root.display(),
        timeout_ms = config.limits.timeout_ms,
        max_concurrent = config.max_concurrent_executions,
        "code runner listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("code runner stopped");
    Ok(())
}

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining in-flight executions");
}
