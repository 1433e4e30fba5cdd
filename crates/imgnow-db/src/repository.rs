use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imgnow_core::{AppError, FileRecord, NewFileRecord, SettingsUpdate};

/// Record store used by ingestion and retention.
///
/// Identifiers are never reused: `identifier_exists` and `insert` consider soft-deleted
/// rows as taken.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn identifier_exists(&self, identifier: &str) -> Result<bool, AppError>;

    /// Create a `Pending` record. Fails with `AppError::Conflict` when the identifier is taken.
    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError>;

    async fn get(&self, identifier: &str) -> Result<Option<FileRecord>, AppError>;

    /// `Pending -> Active`, recording where the blob lives. Creation metadata (name,
    /// size, content type) is left as captured at insert. Returns false when the record
    /// is no longer pending (deleted while ingestion was running).
    async fn mark_active(&self, identifier: &str, path: &str) -> Result<bool, AppError>;

    /// `Pending -> Error`.
    async fn mark_error(&self, identifier: &str) -> Result<bool, AppError>;

    /// Atomically add one view and stamp `last_viewed_at`. Returns the updated row, or
    /// `None` if the record does not exist or is deleted.
    async fn increment_views(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, AppError>;

    /// Atomically add one download. Same contract as [`FileRepository::increment_views`].
    async fn increment_downloads(&self, identifier: &str) -> Result<Option<FileRecord>, AppError>;

    async fn update_settings(
        &self,
        identifier: &str,
        update: &SettingsUpdate,
    ) -> Result<Option<FileRecord>, AppError>;

    /// Soft delete: set `deleted_at`, force `status = error` and clear `path`.
    ///
    /// Only succeeds for a live record, so exactly one concurrent caller gets `true`.
    async fn mark_deleted(&self, identifier: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Live records whose expiry is at or before `now`, oldest expiry first.
    async fn expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FileRecord>, AppError>;
}
