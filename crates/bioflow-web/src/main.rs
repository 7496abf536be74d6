//! HTTP API front-end (spec §6). Grounded on
//! `ferrumdeck::gateway::main`'s env-var-configured startup and
//! `axum::serve` loop, narrowed to this engine's single `AppState`.

mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bioflow_core::Engine;
use bioflow_runtime::{ContainerDriver, MockContainerDriver, ProcessContainerDriver};
use bioflow_store::{SqliteStateRepository, StateRepository};
use tracing::info;
use tracing_subscriber::EnvFilter;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let data_dir: PathBuf = std::env::var("BIOFLOW_DATA_DIR")
        .unwrap_or_else(|_| "./bioflow-data".to_string())
        .into();
    std::fs::create_dir_all(&data_dir).with_context(|| format!("create {}", data_dir.display()))?;

    let db_path = data_dir.join("state.sqlite3");
    let pool = bioflow_store::open(&db_path.to_string_lossy()).await?;
    let store: Arc<dyn StateRepository> = Arc::new(SqliteStateRepository::new(pool));

    let dry_run = std::env::var("BIOFLOW_DRY_RUN").is_ok();
    let driver: Arc<dyn ContainerDriver> = if dry_run {
        Arc::new(MockContainerDriver::new())
    } else {
        Arc::new(ProcessContainerDriver::default())
    };

    let engine = Arc::new(Engine::new(data_dir.join("runs-base"), store.clone(), driver));
    let state = AppState::new(engine, store);
    let app = routes::build_router(state);

    let addr: SocketAddr = std::env::var("BIOFLOW_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid BIOFLOW_BIND_ADDR")?;

    info!(%addr, "bioflow-web listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
