//! Service wiring

use std::sync::Arc;
use std::time::Duration;

use imgnow_broker::TranscodeRpcClient;
use imgnow_core::Config;
use imgnow_db::FileRepository;
use imgnow_services::{ExpirySweeper, FileAccessService, IngestionCoordinator, RetentionEngine};
use imgnow_storage::Storage;

use crate::state::AppState;

/// Build the application state from already-initialized infrastructure.
pub fn initialize_services(
    config: &Config,
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    transcoder: TranscodeRpcClient,
) -> (Arc<AppState>, ExpirySweeper) {
    let retention = RetentionEngine::new(repository.clone(), storage.clone());

    let ingestion = IngestionCoordinator::new(
        repository.clone(),
        storage.clone(),
        transcoder,
        config.allow_other_media,
    );

    let files = FileAccessService::new(
        repository.clone(),
        storage.clone(),
        retention.clone(),
        Duration::from_secs(config.presign_ttl_seconds),
    );

    let sweeper = ExpirySweeper::new(
        retention,
        Duration::from_secs(config.expiry_sweep_interval_seconds),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        repository,
        storage,
        ingestion,
        files,
    });

    (state, sweeper)
}
