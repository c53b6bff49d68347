use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::db::{DbHandle, DeskDb};
use super::recurrence::RecurrenceEngine;
use crate::config::{Config, ReportConfig, WorkflowConfig};

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
    pub dev_mode: bool,
    pub workflow: WorkflowConfig,
    pub reports: ReportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.server.db_path.clone(),
            busy_timeout: Duration::from_millis(config.database.busy_timeout_ms),
            dev_mode: config.server.dev_mode,
            workflow: config.workflow.clone(),
            reports: config.reports.clone(),
        }
    }
}

/// Build the full application router. Dev mode adds permissive CORS.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Open the database, bind, and serve until ctrl-c.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = DeskDb::new(&config.db_path, config.busy_timeout)
        .context("Failed to initialize desk database")?;

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        engine: RecurrenceEngine::default(),
        workflow: config.workflow.clone(),
        reports: config.reports.clone(),
    });
    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        db_path = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "flowdesk listening"
    );
    println!("flowdesk running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        // Without a handler the server runs until killed.
        Err(e) => {
            tracing::warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    }
}
