use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use imgnow_core::StorageBackend;
use serde::Serialize;

use crate::state::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Run an async check with timeout; returns "healthy", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub repository: String,
    pub storage: StorageBackend,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let repository = run_check(
        CHECK_TIMEOUT,
        async { state.repository.identifier_exists("health").await.map(|_| ()) },
        "unhealthy",
    )
    .await;

    let healthy = repository == "healthy";
    let response = HealthCheckResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        repository,
        storage: state.storage.backend_type(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
