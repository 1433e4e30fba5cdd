//! Application setup and initialization
//!
//! Every external client (record store, blob storage, broker) is created once here
//! and shared by the services for the lifetime of the process.

pub mod broker;
pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use imgnow_core::Config;
use tokio::task::JoinHandle;

use crate::state::AppState;
use broker::TranscodeBackend;

/// Long-running tasks owned by the process, stopped after the server exits.
pub struct BackgroundTasks {
    sweeper: JoinHandle<()>,
    transcode: TranscodeBackend,
}

impl BackgroundTasks {
    pub async fn shutdown(self, drain: Duration) {
        self.sweeper.abort();
        self.transcode.shutdown(drain).await;
        tracing::info!("Background tasks stopped");
    }
}

/// Initialize the entire application
pub async fn initialize_app(
    config: Config,
) -> Result<(Arc<AppState>, axum::Router, BackgroundTasks)> {
    // Fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;
    tracing::info!("Configuration loaded and validated successfully");

    let repository = database::setup_repository(&config).await?;
    let storage = storage::setup_storage(&config).await?;
    let transcode = broker::setup_broker(&config).await?;

    let rpc = transcode.rpc_client(Duration::from_secs(config.transcode_timeout_seconds));
    let (state, sweeper) = services::initialize_services(&config, repository, storage, rpc);

    let sweeper = Arc::new(sweeper).start();
    tracing::info!(
        interval_seconds = config.expiry_sweep_interval_seconds,
        "Expiry sweeper started"
    );

    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router, BackgroundTasks { sweeper, transcode }))
}
