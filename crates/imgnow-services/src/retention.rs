//! Retention: view/download-triggered deletion, expiry and soft delete.
//!
//! Counters are incremented atomically by the repository, and the caller acts on the
//! row the increment returned. The deletion transition is conditional, so when several
//! callers cross a threshold together only one of them deletes the blob.

use std::sync::Arc;

use chrono::Utc;
use imgnow_core::{AppError, FileRecord};
use imgnow_db::FileRepository;
use imgnow_storage::{storage_key, Storage};

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub found: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct RetentionEngine {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
}

impl RetentionEngine {
    pub fn new(repository: Arc<dyn FileRepository>, storage: Arc<dyn Storage>) -> Self {
        Self {
            repository,
            storage,
        }
    }

    /// Count one view, deleting the file if that view reached its view threshold.
    ///
    /// Returns the record as of this view, or `None` if it was already gone. A view
    /// that reaches the threshold still gets the record back.
    #[tracing::instrument(skip(self))]
    pub async fn record_view(&self, identifier: &str) -> Result<Option<FileRecord>, AppError> {
        let Some(record) = self
            .repository
            .increment_views(identifier, Utc::now())
            .await?
        else {
            return Ok(None);
        };

        if record.view_threshold_reached() {
            tracing::info!(
                views = record.view_count,
                threshold = ?record.view_threshold,
                "View threshold reached, deleting file"
            );
            self.delete(identifier).await?;
        }

        Ok(Some(record))
    }

    /// Count one download, deleting the file if it reached its download threshold.
    #[tracing::instrument(skip(self))]
    pub async fn record_download(&self, identifier: &str) -> Result<Option<FileRecord>, AppError> {
        let Some(record) = self.repository.increment_downloads(identifier).await? else {
            return Ok(None);
        };

        if record.download_threshold_reached() {
            tracing::info!(
                downloads = record.download_count,
                threshold = ?record.download_threshold,
                "Download threshold reached, deleting file"
            );
            self.delete(identifier).await?;
        }

        Ok(Some(record))
    }

    /// Soft-delete a record and remove its blob.
    ///
    /// Returns `true` if this call performed the deletion, `false` if the record was
    /// already deleted or never existed. Blob removal failures are logged only.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, identifier: &str) -> Result<bool, AppError> {
        if !self.repository.mark_deleted(identifier, Utc::now()).await? {
            tracing::debug!("File already deleted");
            return Ok(false);
        }

        let key = storage_key(identifier);
        match self.storage.delete(&key).await {
            Ok(()) => tracing::debug!(storage_key = %key, "Blob deleted"),
            Err(e) => tracing::error!(
                error = %e,
                storage_key = %key,
                "Failed to delete blob, record already marked deleted"
            ),
        }

        tracing::info!("File deleted");
        Ok(true)
    }

    /// Delete `record` if its expiry has passed. Returns whether it is expired.
    pub async fn expire_if_due(&self, record: &FileRecord) -> Result<bool, AppError> {
        if !record.is_expired(Utc::now()) {
            return Ok(false);
        }
        tracing::info!(
            identifier = %record.identifier,
            expires_at = ?record.expires_at,
            "File expired"
        );
        self.delete(&record.identifier).await?;
        Ok(true)
    }

    /// Delete up to `limit` expired records. One failure does not stop the others.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, limit: i64) -> Result<SweepReport, AppError> {
        let expired = self.repository.expired(Utc::now(), limit).await?;
        let mut report = SweepReport {
            found: expired.len(),
            ..SweepReport::default()
        };

        for record in expired {
            match self.delete(&record.identifier).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        error = %e,
                        identifier = %record.identifier,
                        "Failed to delete expired file, continuing"
                    );
                }
            }
        }

        if report.found > 0 {
            tracing::info!(
                found = report.found,
                deleted = report.deleted,
                failed = report.failed,
                "Expiry sweep completed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        insert_active, insert_stored, local_storage, memory_repository, BrokenStorage,
    };
    use chrono::Duration as ChronoDuration;
    use imgnow_core::{FileStatus, RetentionRule, SettingsUpdate};
    use imgnow_db::MemoryFileRepository;

    async fn set_rules(
        repo: &MemoryFileRepository,
        id: &str,
        view: Option<i32>,
        download: Option<i32>,
    ) {
        let rule = |threshold: Option<i32>| RetentionRule {
            enabled: threshold.is_some(),
            threshold,
        };
        repo.update_settings(
            id,
            &SettingsUpdate {
                view_rule: Some(rule(view)),
                download_rule: Some(rule(download)),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();
    }

    async fn expire(repo: &MemoryFileRepository, id: &str) {
        repo.update_settings(
            id,
            &SettingsUpdate {
                expires_at: Some(Utc::now() - ChronoDuration::seconds(5)),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_download_threshold_deletes_on_third_download() {
        let repo = memory_repository();
        let (_dir, storage) = local_storage().await;
        insert_stored(&repo, &storage, "abc").await;
        set_rules(&repo, "abc", None, Some(3)).await;
        let engine = RetentionEngine::new(repo.clone(), storage.clone());

        for expected in 1..=2 {
            let record = engine.record_download("abc").await.unwrap().unwrap();
            assert_eq!(record.download_count, expected);
            assert!(!record.is_deleted());
        }

        let third = engine.record_download("abc").await.unwrap().unwrap();
        assert_eq!(third.download_count, 3);

        let stored = repo.get("abc").await.unwrap().unwrap();
        assert!(stored.is_deleted());
        assert_eq!(stored.status, FileStatus::Error);
        assert!(stored.path.is_none());
        assert!(!storage.exists(&storage_key("abc")).await.unwrap());

        assert!(engine.record_download("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_view_reaching_threshold_still_returns_path() {
        let repo = memory_repository();
        let (_dir, storage) = local_storage().await;
        insert_stored(&repo, &storage, "once").await;
        set_rules(&repo, "once", Some(1), None).await;
        let engine = RetentionEngine::new(repo.clone(), storage);

        let record = engine.record_view("once").await.unwrap().unwrap();
        assert_eq!(record.view_count, 1);
        assert!(record.path.is_some());
        assert!(record.last_viewed_at.is_some());

        assert!(repo.get("once").await.unwrap().unwrap().is_deleted());
        assert!(engine.record_view("once").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counts_without_policy_never_delete() {
        let repo = memory_repository();
        let (_dir, storage) = local_storage().await;
        insert_active(&repo, "keep").await;
        let engine = RetentionEngine::new(repo.clone(), storage);

        for _ in 0..10 {
            engine.record_view("keep").await.unwrap();
            engine.record_download("keep").await.unwrap();
        }
        let record = repo.get("keep").await.unwrap().unwrap();
        assert_eq!(record.view_count, 10);
        assert_eq!(record.download_count, 10);
        assert!(!record.is_deleted());
    }

    #[tokio::test]
    async fn test_delete_survives_storage_failure_and_is_idempotent() {
        let repo = memory_repository();
        insert_active(&repo, "gone").await;
        let engine = RetentionEngine::new(repo.clone(), Arc::new(BrokenStorage));

        assert!(engine.delete("gone").await.unwrap());
        assert!(!engine.delete("gone").await.unwrap());
        assert!(!engine.delete("never-existed").await.unwrap());

        let record = repo.get("gone").await.unwrap().unwrap();
        assert!(record.deleted_at.is_some());
        assert_eq!(record.status, FileStatus::Error);
    }

    #[tokio::test]
    async fn test_concurrent_downloads_delete_once() {
        let repo = memory_repository();
        let (_dir, storage) = local_storage().await;
        insert_stored(&repo, &storage, "race").await;
        set_rules(&repo, "race", None, Some(5)).await;
        let engine = Arc::new(RetentionEngine::new(repo.clone(), storage.clone()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.record_download("race").await.unwrap() })
            })
            .collect();

        let mut counted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                counted += 1;
            }
        }

        assert!(counted >= 5);
        let record = repo.get("race").await.unwrap().unwrap();
        assert!(record.is_deleted());
        assert_eq!(record.download_count, counted);
        assert!(!storage.exists(&storage_key("race")).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired() {
        let repo = memory_repository();
        let (_dir, storage) = local_storage().await;
        for id in ["old1", "old2", "fresh"] {
            insert_stored(&repo, &storage, id).await;
        }
        expire(&repo, "old1").await;
        expire(&repo, "old2").await;
        repo.update_settings(
            "fresh",
            &SettingsUpdate {
                expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();
        let engine = RetentionEngine::new(repo.clone(), storage.clone());

        let report = engine.sweep_expired(100).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                found: 2,
                deleted: 2,
                failed: 0
            }
        );
        assert!(repo.get("old1").await.unwrap().unwrap().is_deleted());
        assert!(repo.get("old2").await.unwrap().unwrap().is_deleted());
        assert!(!repo.get("fresh").await.unwrap().unwrap().is_deleted());
        assert!(storage.exists(&storage_key("fresh")).await.unwrap());

        // Nothing left on the next pass.
        assert_eq!(engine.sweep_expired(100).await.unwrap().found, 0);
    }

    #[tokio::test]
    async fn test_expire_if_due() {
        let repo = memory_repository();
        let (_dir, storage) = local_storage().await;
        insert_active(&repo, "late").await;
        let engine = RetentionEngine::new(repo.clone(), storage);

        let record = repo.get("late").await.unwrap().unwrap();
        assert!(!engine.expire_if_due(&record).await.unwrap());

        expire(&repo, "late").await;
        let record = repo.get("late").await.unwrap().unwrap();
        assert!(engine.expire_if_due(&record).await.unwrap());
        assert!(repo.get("late").await.unwrap().unwrap().is_deleted());
    }
}
