mod mcp;
mod routes;
mod state;
mod ws;

use std::time::Duration;

use anyhow::Result;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chronicle_common::Config;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chronicle=info".parse()?))
        .init();

    info!("Chronicle timeline service starting...");

    let config = Config::from_env();
    config.log_redacted();

    let state = AppState::build(config).await?;
    spawn_stuck_task_reaper(state.clone());

    let address = format!("{}:{}", state.config.server_host, state.config.server_port);
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Background maintenance: mark tasks stuck in `processing` as failed once
/// they exceed the configured cutoff.
fn spawn_stuck_task_reaper(state: AppState) {
    let cutoff_hours = state.config.stuck_task_timeout_hours;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            match state.store.reap_stuck_tasks(cutoff_hours).await {
                Ok(0) => {}
                Ok(reaped) => info!(reaped, "reaped stuck tasks"),
                Err(e) => warn!(error = %e, "stuck task reap failed"),
            }
        }
    });
}
