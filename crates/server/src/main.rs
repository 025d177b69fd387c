mod api;
mod bootstrap;
mod health;
pub mod service;

use std::sync::Arc;

use anyhow::Result;

use estateflow_core::audit::TracingAuditSink;
use estateflow_core::config::{AppConfig, LoadOptions};
use estateflow_db::repositories::{SqlPropertyRepository, SqlWorkflowRepository};

use crate::service::ApprovalService;

fn init_logging(config: &AppConfig) {
    use estateflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let service = Arc::new(ApprovalService::new(
        Arc::new(SqlPropertyRepository::new(app.db_pool.clone())),
        Arc::new(SqlWorkflowRepository::new(app.db_pool.clone())),
        Arc::new(TracingAuditSink),
    ));
    let router = api::router(service);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "estateflow-server started"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "estateflow-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
