//! Storage setup and initialization

use anyhow::Result;
use imgnow_core::Config;
use imgnow_storage::{create_storage, Storage};
use std::sync::Arc;

/// Create the process-wide blob storage client.
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage...");
    let storage = create_storage(config).await?;
    tracing::info!(
        backend = ?storage.backend_type(),
        bucket = ?config.s3_bucket,
        endpoint = ?config.s3_endpoint,
        "Storage initialized"
    );
    Ok(storage)
}
