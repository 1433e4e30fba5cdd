//! Application state shared by all handlers.

use std::sync::Arc;

use imgnow_core::Config;
use imgnow_db::FileRepository;
use imgnow_services::{FileAccessService, IngestionCoordinator};
use imgnow_storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repository: Arc<dyn FileRepository>,
    pub storage: Arc<dyn Storage>,
    pub ingestion: IngestionCoordinator,
    pub files: FileAccessService,
}

impl AppState {
    /// Address clients poll for the outcome of an upload.
    pub fn status_url(&self, identifier: &str) -> String {
        format!(
            "{}{}/{}/status",
            self.config.public_base_url,
            crate::constants::API_PREFIX,
            identifier
        )
    }
}
