//! Upload state machine: `Pending -> {Active, Error}`.
//!
//! [`IngestionCoordinator::accept`] creates the `Pending` record and returns as soon as
//! it exists. Compression or transcoding and the blob upload continue on a spawned
//! task, which only talks to the record store; the caller's copy of the record is
//! never updated after dispatch.

use std::sync::Arc;
use std::time::Instant;

use imgnow_broker::TranscodeRpcClient;
use imgnow_core::{AppError, FileRecord, MediaKind, NewFileRecord};
use imgnow_db::FileRepository;
use imgnow_processing::{ImageCompressor, MediaClassifier};
use imgnow_storage::{storage_key, Storage};
use tokio::task::JoinHandle;

use crate::allocator::IdentifierAllocator;

/// Content type of every transcoded video.
const TRANSCODED_CONTENT_TYPE: &str = "video/mp4";

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub original_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
    /// Custom identifier asked for by the client.
    pub requested_identifier: Option<String>,
}

/// An upload that now has a `Pending` record.
#[derive(Debug)]
pub struct Accepted {
    pub identifier: String,
    pub media_kind: MediaKind,
    /// Background processing; callers normally let it run detached.
    pub task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    allocator: IdentifierAllocator,
    classifier: MediaClassifier,
    compressor: ImageCompressor,
    transcoder: TranscodeRpcClient,
}

impl IngestionCoordinator {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        storage: Arc<dyn Storage>,
        transcoder: TranscodeRpcClient,
        allow_other_media: bool,
    ) -> Self {
        Self {
            allocator: IdentifierAllocator::new(repository.clone()),
            repository,
            storage,
            classifier: MediaClassifier::new(allow_other_media),
            compressor: ImageCompressor::new(),
            transcoder,
        }
    }

    pub fn with_allocator(mut self, allocator: IdentifierAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Validate the upload, reserve its identifier and start background processing.
    #[tracing::instrument(
        skip(self, upload),
        fields(
            original_name = %upload.original_name,
            content_type = %upload.content_type,
            size_bytes = upload.data.len(),
            identifier
        )
    )]
    pub async fn accept(&self, upload: UploadRequest) -> Result<Accepted, AppError> {
        let media_kind = MediaClassifier::classify(&upload.content_type);
        if !self.classifier.accepts(media_kind) {
            return Err(AppError::UnsupportedMediaType(format!(
                "Content type '{}' is not accepted",
                upload.content_type
            )));
        }
        if upload.data.is_empty() {
            return Err(AppError::InvalidInput("Uploaded file is empty".to_string()));
        }

        let record = self.reserve(&upload, media_kind).await?;
        let identifier = record.identifier;
        tracing::Span::current().record("identifier", identifier.as_str());
        tracing::info!(media_kind = ?media_kind, "Upload accepted, processing in background");

        let this = self.clone();
        let task_identifier = identifier.clone();
        let task = tokio::spawn(async move {
            this.process(
                task_identifier,
                media_kind,
                upload.original_name,
                upload.content_type,
                upload.data,
            )
            .await;
        });

        Ok(Accepted {
            identifier,
            media_kind,
            task,
        })
    }

    /// Allocate an identifier and insert the `Pending` record.
    async fn reserve(
        &self,
        upload: &UploadRequest,
        media_kind: MediaKind,
    ) -> Result<FileRecord, AppError> {
        let requested = upload
            .requested_identifier
            .as_deref()
            .filter(|id| !id.is_empty());

        let new_record = |identifier: String| NewFileRecord {
            identifier,
            original_name: upload.original_name.clone(),
            size: upload.data.len() as i64,
            mime_type: upload.content_type.clone(),
            media_kind,
        };

        let identifier = self.allocator.allocate(requested).await?;
        match self.repository.insert(new_record(identifier)).await {
            // A generated identifier can lose a race with a concurrent upload between the
            // existence check and the insert; draw again once.
            Err(AppError::Conflict(_)) if requested.is_none() => {
                tracing::debug!("Generated identifier taken concurrently, reallocating");
                let identifier = self.allocator.allocate(None).await?;
                self.repository.insert(new_record(identifier)).await
            }
            result => result,
        }
    }

    /// Background half of an upload: produce the final payload, store it and settle
    /// the record.
    #[tracing::instrument(skip(self, original_name, content_type, data), fields(size_bytes = data.len()))]
    pub async fn process(
        &self,
        identifier: String,
        media_kind: MediaKind,
        original_name: String,
        content_type: String,
        data: Vec<u8>,
    ) {
        let start = Instant::now();

        let stored = self
            .prepare_and_store(&identifier, media_kind, &original_name, content_type, data)
            .await;

        let (path, size, mime_type) = match stored {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Ingestion failed"
                );
                self.fail(&identifier).await;
                return;
            }
        };

        match self.repository.mark_active(&identifier, &path).await {
            Ok(true) => tracing::info!(
                stored_bytes = size,
                stored_content_type = %mime_type,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Upload active"
            ),
            Ok(false) => {
                // Deleted (for example expired) while processing: drop the new blob.
                tracing::warn!("Record no longer pending, discarding stored blob");
                if let Err(e) = self.storage.delete(&storage_key(&identifier)).await {
                    tracing::error!(error = %e, "Failed to delete orphaned blob");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to activate record");
                self.fail(&identifier).await;
            }
        }
    }

    async fn fail(&self, identifier: &str) {
        if let Err(e) = self.repository.mark_error(identifier).await {
            tracing::error!(error = %e, "Failed to mark record as failed");
        }
    }

    /// Returns (path, stored size, stored content type). The stored size and type only
    /// describe the blob; the record keeps what the client uploaded.
    async fn prepare_and_store(
        &self,
        identifier: &str,
        media_kind: MediaKind,
        original_name: &str,
        content_type: String,
        data: Vec<u8>,
    ) -> Result<(String, i64, String), AppError> {
        let (payload, mime_type) = match media_kind {
            MediaKind::Image => {
                let compressor = self.compressor;
                let kind = content_type.clone();
                let payload = tokio::task::spawn_blocking(move || {
                    compressor.compress_or_original(data, &kind)
                })
                .await
                .map_err(|e| AppError::Internal(format!("Image compression task failed: {}", e)))?;
                (payload, content_type)
            }
            MediaKind::Video => {
                let output = self.transcoder.transcode(original_name, data).await?;
                (output.content, TRANSCODED_CONTENT_TYPE.to_string())
            }
            MediaKind::Other => (data, content_type),
        };

        let size = payload.len() as i64;
        let (_, url) = self
            .storage
            .upload(&storage_key(identifier), &mime_type, payload)
            .await?;

        Ok((url, size, mime_type))
    }
}
