//! Shared fixtures for service tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imgnow_core::{FileRecord, MediaKind, NewFileRecord, StorageBackend};
use imgnow_db::{FileRepository, MemoryFileRepository};
use imgnow_storage::{storage_key, LocalStorage, Storage, StorageError, StorageResult};
use tempfile::TempDir;

pub const BASE_URL: &str = "http://localhost:8080/media";

pub fn memory_repository() -> Arc<MemoryFileRepository> {
    Arc::new(MemoryFileRepository::new())
}

pub async fn local_storage() -> (TempDir, Arc<LocalStorage>) {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path(), BASE_URL.to_string())
        .await
        .unwrap();
    (dir, Arc::new(storage))
}

pub async fn insert_pending(repo: &MemoryFileRepository, identifier: &str) -> FileRecord {
    repo.insert(NewFileRecord {
        identifier: identifier.to_string(),
        original_name: format!("{}.png", identifier),
        size: 4,
        mime_type: "image/png".to_string(),
        media_kind: MediaKind::Image,
    })
    .await
    .unwrap()
}

/// Insert a record and move it to `Active` with a path derived from its key.
pub async fn insert_active(repo: &MemoryFileRepository, identifier: &str) -> FileRecord {
    insert_pending(repo, identifier).await;
    let path = format!("{}/{}", BASE_URL, storage_key(identifier));
    assert!(repo.mark_active(identifier, &path).await.unwrap());
    repo.get(identifier).await.unwrap().unwrap()
}

/// Active record whose blob actually exists in `storage`.
pub async fn insert_stored(
    repo: &MemoryFileRepository,
    storage: &LocalStorage,
    identifier: &str,
) -> FileRecord {
    storage
        .upload(&storage_key(identifier), "image/png", b"blob".to_vec())
        .await
        .unwrap();
    insert_active(repo, identifier).await
}

/// Storage whose every operation fails.
pub struct BrokenStorage;

#[async_trait]
impl Storage for BrokenStorage {
    async fn upload(&self, _: &str, _: &str, _: Vec<u8>) -> StorageResult<(String, String)> {
        Err(StorageError::UploadFailed("bucket unavailable".to_string()))
    }

    async fn download(&self, _: &str) -> StorageResult<Vec<u8>> {
        Err(StorageError::DownloadFailed("bucket unavailable".to_string()))
    }

    async fn delete(&self, _: &str) -> StorageResult<()> {
        Err(StorageError::DeleteFailed("bucket unavailable".to_string()))
    }

    async fn presigned_url(&self, _: &str, _: Duration) -> StorageResult<String> {
        Err(StorageError::BackendError("bucket unavailable".to_string()))
    }

    async fn exists(&self, _: &str) -> StorageResult<bool> {
        Err(StorageError::BackendError("bucket unavailable".to_string()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
